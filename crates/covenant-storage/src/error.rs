//! Storage error types

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors in cache persistence
#[derive(Error, Debug)]
pub enum StorageError {
    /// Snapshot file could not be read or written
    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot path is unusable
    #[error("Invalid snapshot path: {0}")]
    InvalidPath(String),
}

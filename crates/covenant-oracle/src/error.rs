//! Oracle error types

use thiserror::Error;

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors reaching or decoding the oracle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The request did not complete in time
    #[error("Oracle request timed out after {0}s")]
    Timeout(u64),

    /// The source reported a failure
    #[error("Oracle source error: {0}")]
    Source(String),

    /// The response could not be decoded
    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Whether a later retry can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Source(_))
    }
}

//! Node error types

use covenant_core::Fixed;
use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors raised by the commitment engine
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] covenant_storage::StorageError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] covenant_oracle::OracleError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] covenant_crypto::CryptoError),

    #[error(transparent)]
    Core(#[from] covenant_core::CovenantError),

    /// Dual-asset stakes are switched off in the staking policy
    #[error("Dash stakes are disabled")]
    DashStakeDisabled,

    /// Owner already has too much in pending whale stakes
    #[error("Pending whale stakes for {owner} total {pending}, limit {limit}")]
    PendingLimit {
        owner: String,
        pending: Fixed,
        limit: Fixed,
    },

    /// The pool currently offers no yield
    #[error("No {0} yield offered at this height")]
    Saturated(String),

    /// A stake request failed a local pre-check
    #[error("Invalid stake request: {0}")]
    InvalidRequest(String),
}

impl NodeError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::Config(_) => 3001,
            Self::Storage(_) => 3002,
            Self::Oracle(_) => 3003,
            Self::Crypto(_) => 3004,
            Self::Core(e) => e.code(),
            Self::DashStakeDisabled => 3101,
            Self::PendingLimit { .. } => 3102,
            Self::Saturated(_) => 3103,
            Self::InvalidRequest(_) => 3104,
        }
    }

    /// The caller may retry later or with different arguments
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Oracle(e) => e.is_recoverable(),
            Self::PendingLimit { .. } | Self::Saturated(_) | Self::InvalidRequest(_) => true,
            _ => false,
        }
    }
}

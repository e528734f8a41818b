//! Error types for Covenant core operations

use thiserror::Error;

/// Result type alias for Covenant operations
pub type Result<T> = std::result::Result<T, CovenantError>;

/// Errors that can occur in Covenant core operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CovenantError {
    // === Ledger ===
    /// Transaction id is not valid hex of the right length
    #[error("Invalid transaction id: {0}")]
    InvalidTxId(String),

    /// Outpoint string is not `<txid>-<index>`
    #[error("Invalid outpoint: {0}")]
    InvalidOutPoint(String),

    /// Transaction is unknown to the ledger
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // === Payloads ===
    /// A tagged field is missing from a payload
    #[error("Missing payload field <{0}>")]
    MissingField(&'static str),

    /// A tagged field did not decode
    #[error("Malformed payload field <{field}>: {value}")]
    MalformedField { field: &'static str, value: String },

    // === Arithmetic ===
    /// Division by zero or overflow in fixed-point math
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    // === General ===
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CovenantError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidTxId(_) | Self::InvalidOutPoint(_) => 1001,
            Self::TransactionNotFound(_) => 1002,
            Self::MissingField(_) | Self::MalformedField { .. } => 1003,
            Self::Arithmetic(_) => 1004,
            Self::InvalidInput(_) => 1005,
            Self::Internal(_) => 9999,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransactionNotFound(_))
    }
}

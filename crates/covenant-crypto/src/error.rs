//! Cryptographic error types

use thiserror::Error;

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Address is not valid base58check or has the wrong shape
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Address carries a different version byte than expected
    #[error("Address version {found} does not match expected {expected}")]
    VersionMismatch { expected: u8, found: u8 },

    /// Invalid public key
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid secret key
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// Signature bytes are malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Signature text is not base64
    #[error("Malformed base64 encoding")]
    MalformedBase64,

    /// No public key could be recovered from the signature
    #[error("Unable to recover public key")]
    RecoveryFailed,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

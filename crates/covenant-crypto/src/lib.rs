//! # Covenant Cryptography
//!
//! The signature scheme dual-asset stakes use to prove control of both the
//! local and the external UTXO:
//! - `sha256d` / `hash160` digests
//! - base58check addresses with a per-network version byte
//! - domain-prefixed message hashing
//! - 65-byte compact recoverable secp256k1 signatures, base64 encoded
//!
//! | Network | Address version |
//! |---------|-----------------|
//! | native  | 25              |
//! | dash    | 76              |

pub mod address;
pub mod compact;
pub mod error;
pub mod hash;

pub use address::*;
pub use compact::*;
pub use error::*;
pub use hash::*;

/// Cryptographic prelude
pub mod prelude {
    pub use crate::address::{Address, DASH_ADDRESS_VERSION, NATIVE_ADDRESS_VERSION};
    pub use crate::compact::{recover_compact, sign_compact, sign_utxo, verify_utxo_signature, KeyPair};
    pub use crate::error::{CryptoError, Result};
    pub use crate::hash::{hash160, sha256d, signed_message_hash};
}

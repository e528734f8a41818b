//! Base58check pay-to-pubkey-hash addresses

use crate::error::{CryptoError, Result};
use crate::hash::hash160;
use std::fmt;
use std::str::FromStr;

/// Version byte of native-chain addresses
pub const NATIVE_ADDRESS_VERSION: u8 = 25;

/// Version byte of Dash addresses
pub const DASH_ADDRESS_VERSION: u8 = 76;

/// A decoded address: version byte and 20-byte key hash
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    key_id: [u8; 20],
}

impl Address {
    pub fn new(version: u8, key_id: [u8; 20]) -> Self {
        Self { version, key_id }
    }

    /// Address of a serialized public key (33 or 65 bytes)
    pub fn from_pubkey(version: u8, pubkey: &[u8]) -> Self {
        Self::new(version, hash160(pubkey))
    }

    /// Decode base58check text
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = bs58::decode(text.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| CryptoError::InvalidAddress(format!("{text}: {e}")))?;
        if bytes.len() != 21 {
            return Err(CryptoError::InvalidAddress(format!(
                "{text}: payload is {} bytes",
                bytes.len()
            )));
        }
        let mut key_id = [0u8; 20];
        key_id.copy_from_slice(&bytes[1..]);
        Ok(Self::new(bytes[0], key_id))
    }

    /// Decode and require a specific version byte
    pub fn parse_with_version(text: &str, version: u8) -> Result<Self> {
        let address = Self::parse(text)?;
        if address.version != version {
            return Err(CryptoError::VersionMismatch {
                expected: version,
                found: address.version,
            });
        }
        Ok(address)
    }

    /// Syntactic validity for the given network version
    pub fn is_valid(text: &str, version: u8) -> bool {
        Self::parse_with_version(text, version).is_ok()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn key_id(&self) -> &[u8; 20] {
        &self.key_id
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version);
        payload.extend_from_slice(&self.key_id);
        bs58::encode(payload).with_check().into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

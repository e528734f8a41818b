//! Compact recoverable signatures
//!
//! 65 bytes: a header byte `27 + recovery_id (+ 4 when the key is compressed)`
//! followed by the 64-byte `r || s`. The verifier never sees the public key;
//! it recovers it from the signature and compares its hash to the address.

use crate::address::Address;
use crate::error::{CryptoError, Result};
use crate::hash::signed_message_hash;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use tracing::debug;

const COMPACT_LEN: usize = 65;
const HEADER_BASE: u8 = 27;
const COMPRESSED_FLAG: u8 = 4;

/// secp256k1 key pair
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let signing =
            SigningKey::from_slice(secret).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        Ok(Self { signing })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes().into()
    }

    /// Compressed SEC1 public key
    pub fn public_key(&self) -> Vec<u8> {
        self.signing
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn address(&self, version: u8) -> Address {
        Address::from_pubkey(version, &self.public_key())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair({})", hex::encode(self.public_key()))
    }
}

/// Sign a 32-byte digest into the compact form, compressed-key header
pub fn sign_compact(key: &KeyPair, digest: &[u8; 32]) -> Result<[u8; COMPACT_LEN]> {
    let (signature, recovery_id) = key
        .signing
        .sign_prehash_recoverable(digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    let mut out = [0u8; COMPACT_LEN];
    out[0] = HEADER_BASE + recovery_id.to_byte() + COMPRESSED_FLAG;
    out[1..].copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Recover the serialized public key that produced `compact` over `digest`.
/// The key is returned compressed or uncompressed according to the header.
pub fn recover_compact(digest: &[u8; 32], compact: &[u8]) -> Result<Vec<u8>> {
    if compact.len() != COMPACT_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {COMPACT_LEN} bytes, got {}",
            compact.len()
        )));
    }
    let header = compact[0];
    if !(HEADER_BASE..HEADER_BASE + 8).contains(&header) {
        return Err(CryptoError::InvalidSignature(format!("bad header byte {header}")));
    }
    let offset = header - HEADER_BASE;
    let compressed = offset >= COMPRESSED_FLAG;
    let recovery_id = RecoveryId::from_byte(offset % COMPRESSED_FLAG)
        .ok_or_else(|| CryptoError::InvalidSignature("bad recovery id".into()))?;
    let signature = Signature::from_slice(&compact[1..])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(key.to_encoded_point(compressed).as_bytes().to_vec())
}

/// Base64 compact signature over the UTXO id, as carried in stake payloads
pub fn sign_utxo(key: &KeyPair, utxo: &str) -> Result<String> {
    let digest = signed_message_hash(utxo.as_bytes());
    Ok(STANDARD.encode(sign_compact(key, &digest)?))
}

/// True when `signature` over `utxo` was made by the key behind `address`,
/// and `address` carries the expected network `version`.
pub fn verify_utxo_signature(address: &str, utxo: &str, signature: &str, version: u8) -> bool {
    if address.is_empty() || utxo.is_empty() || signature.is_empty() {
        return false;
    }
    match recover_utxo_signer(address, utxo, signature, version) {
        Ok(matches) => matches,
        Err(e) => {
            debug!(%address, %utxo, error = %e, "UTXO signature rejected");
            false
        }
    }
}

fn recover_utxo_signer(address: &str, utxo: &str, signature: &str, version: u8) -> Result<bool> {
    let expected = Address::parse_with_version(address, version)?;
    let compact = STANDARD
        .decode(signature.trim())
        .map_err(|_| CryptoError::MalformedBase64)?;
    let digest = signed_message_hash(utxo.as_bytes());
    let pubkey = recover_compact(&digest, &compact)?;
    Ok(Address::from_pubkey(version, &pubkey) == expected)
}

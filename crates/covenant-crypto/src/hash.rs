//! Hash utilities

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Prefix mixed into every signed message so a signature over a UTXO id can
/// never be replayed as a transaction signature.
pub const SIGNED_MESSAGE_MAGIC: &str = "Covenant Signed Message:\n";

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// RIPEMD-160 of SHA-256
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// Append a compact-size length prefix followed by the bytes
fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len();
    if len < 0xfd {
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else if len <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&(len as u64).to_le_bytes());
    }
    out.extend_from_slice(bytes);
}

/// Digest signed for `message`: sha256d over the length-prefixed magic and
/// the length-prefixed message.
pub fn signed_message_hash(message: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(SIGNED_MESSAGE_MAGIC.len() + message.len() + 10);
    write_var_bytes(&mut buf, SIGNED_MESSAGE_MAGIC.as_bytes());
    write_var_bytes(&mut buf, message);
    sha256d(&buf)
}

//! Ledger primitive types
//!
//! These mirror the shapes the commitment layer consumes from the underlying
//! ledger: transactions with annotated outputs, outpoints, and ids.

use crate::error::CovenantError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height. Signed so window arithmetic (`h - 1 day`) never wraps.
pub type Height = i64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Amount in base units
pub type Amount = i64;

/// Base units per coin
pub const COIN: Amount = 100_000_000;

/// Seconds per day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// TxId - 256-bit transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Derive an id from content using BLAKE3
    pub fn from_content(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex (either case)
    pub fn from_hex(s: &str) -> Result<Self, CovenantError> {
        let bytes = hex::decode(s.trim()).map_err(|_| CovenantError::InvalidTxId(s.to_string()))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CovenantError::InvalidTxId(s.to_string()))?;
        Ok(Self(hash))
    }

    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Reference to one output of a transaction, written `<txid>-<index>` in payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Parse the `<txid>-<index>` payload form
    pub fn parse(s: &str) -> Result<Self, CovenantError> {
        let (hash, index) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| CovenantError::InvalidOutPoint(s.to_string()))?;
        let txid = TxId::from_hex(hash).map_err(|_| CovenantError::InvalidOutPoint(s.to_string()))?;
        let vout = index
            .parse::<u32>()
            .map_err(|_| CovenantError::InvalidOutPoint(s.to_string()))?;
        Ok(Self { txid, vout })
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.txid, self.vout)
    }
}

/// Transaction input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
}

/// Transaction output with its optional message annotation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Destination address (base58check)
    pub address: String,
    /// Value in base units
    pub value: Amount,
    /// Attached message (tag-delimited payload), empty if none
    #[serde(default)]
    pub message: String,
}

impl TxOut {
    pub fn new(address: impl Into<String>, value: Amount) -> Self {
        Self {
            address: address.into(),
            value,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// A ledger transaction as seen by the commitment layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Build a transaction and derive its id from the inputs and outputs
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for input in &inputs {
            hasher.update(input.prevout.txid.as_bytes());
            hasher.update(&input.prevout.vout.to_le_bytes());
        }
        for output in &outputs {
            hasher.update(output.address.as_bytes());
            hasher.update(&output.value.to_le_bytes());
            hasher.update(output.message.as_bytes());
        }
        Self {
            txid: TxId::new(*hasher.finalize().as_bytes()),
            inputs,
            outputs,
        }
    }

    /// Concatenation of every output message
    pub fn message(&self) -> String {
        self.outputs.iter().map(|o| o.message.as_str()).collect()
    }

    /// First output paying `address`, with its index
    pub fn output_to(&self, address: &str) -> Option<(usize, &TxOut)> {
        self.outputs
            .iter()
            .enumerate()
            .find(|(_, o)| o.address == address)
    }

    pub fn total_out(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

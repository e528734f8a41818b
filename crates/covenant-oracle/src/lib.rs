//! # Covenant Oracle
//!
//! Read-only view of another chain, fed by an off-chain indexing service.
//!
//! The cache has two halves with different contracts:
//! - `refresh` is async, network-bound, timeout-limited and rate-limited to
//!   one real round-trip per interval. Only the node's background tasks call it.
//! - `query_utxo` / `price` are synchronous lookups of whatever was last
//!   fetched, tagged `Fresh`, `Stale` or `Missing`. Validators only ever call
//!   these.

pub mod cache;
pub mod error;
pub mod response;
pub mod source;

pub use cache::{Freshness, OracleCache, OracleSettings, RefreshOutcome};
pub use error::{OracleError, Result};
pub use response::{parse_price_response, parse_utxo_response, Asset, ExternalUtxo};
pub use source::{OracleSource, ScriptedSource};

//! # Covenant Node
//!
//! Wiring for the stake commitment layer: configuration, logging and the
//! `CommitmentEngine` that ties the ledger, the application cache, the oracle
//! and the stake economics together.
//!
//! ```text
//! NodeConfig ──► CommitmentEngine::open ──► load snapshot
//!                      │
//!   connect_block ─────┼──► StakeRegistry / CoinAgeLedger ──► checkpoint
//!   validate_transaction, payouts_at, prepare_*_stake
//!   run_oracle_refresh (background, rate-limited)
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::{CacheConfig, LogFormat, LoggingConfig, NodeConfig, NodeSettings};
pub use engine::{BlockSummary, CommitmentEngine, DashStakeOptions, WhaleStakeOptions};
pub use error::{NodeError, Result};
pub use logging::init_tracing;

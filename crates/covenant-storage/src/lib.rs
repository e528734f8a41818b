//! # Covenant Storage
//!
//! The application cache every stake, vote and oracle record is read from and
//! written to.
//!
//! ## Layout
//!
//! - `cache` - the `KeyedCache` contract and the concurrent `ApplicationCache`
//! - `snapshot` - full-cache flush to disk and reload at cold boot
//!
//! Entries are addressed by `(section, key)`. Both are canonicalised to upper
//! case unless written with `KeyCase::Sensitive`. A timestamp of zero marks an
//! entry that never goes stale.

pub mod cache;
pub mod error;
pub mod snapshot;

pub use cache::{ApplicationCache, CacheEntry, KeyCase, KeyedCache};
pub use error::{Result, StorageError};
pub use snapshot::{load_snapshot, save_snapshot, SnapshotSummary};

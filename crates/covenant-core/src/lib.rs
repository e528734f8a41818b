//! # Covenant Core
//!
//! Core building blocks shared by every Covenant crate:
//! - `Fixed` - deterministic fixed-point decimal used for all consensus math
//! - `Transaction`, `TxOut`, `OutPoint`, `TxId` - the ledger primitives the
//!   commitment layer reads
//! - `extract_field` / `FieldReader` - the tag-delimited payload reader
//! - `ChainView` - the ledger collaborator interface, with `MemoryChain` as an
//!   in-memory implementation
//!
//! ## Payload Format
//!
//! ```text
//! <MT>DWS</MT><MK>DWS-addr-1700000000</MK><MV><dws>
//!     <returnaddress>..</returnaddress><burnheight>..</burnheight>
//!     <duration>..</duration><dwu>..</dwu>
//! </dws></MV>
//! ```
//!
//! Tags are ASCII, case-sensitive and never nested ambiguously. The reader is
//! not an XML parser: it takes the text between the first opening tag and the
//! following closing tag.

pub mod chain;
pub mod clock;
pub mod error;
pub mod fixed;
pub mod message;
pub mod types;

pub use chain::*;
pub use clock::*;
pub use error::*;
pub use fixed::*;
pub use message::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{ChainView, MemoryChain};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{CovenantError, Result};
    pub use crate::fixed::Fixed;
    pub use crate::message::{extract_field, FieldReader, PayloadBuilder, TxMessage};
    pub use crate::types::*;
}

//! Durable record store for Reposter.
//!
//! All persisted state lives under a single data directory:
//! - `references.json`: every known source reference (operator maintained)
//! - `used.json`: references already consumed by some day's batch
//! - `batches/YYYY-MM-DD.json`: the upload queue for one local date
//! - `ledger.tsv`: one row per prepared item with download/upload timestamps
//!
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written file behind.

mod error;
mod ledger;
mod store;
mod types;

pub use error::StoreError;
pub use ledger::{LEDGER_HEADER, Ledger};
pub use store::RecordStore;
pub use types::{BatchEntry, LedgerRow, TIMESTAMP_FORMAT};

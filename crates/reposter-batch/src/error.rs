//! Error types for batch operations.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while preparing or draining a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] reposter_store::StoreError),

    /// Not enough unused references to fill a batch.
    #[error("insufficient pool: {available} eligible, {requested} requested")]
    InsufficientPool { available: usize, requested: usize },

    /// A queue already exists for the date.
    #[error("batch for {date} already prepared")]
    AlreadyMaterialized { date: NaiveDate },
}

/// Per-item fetch failure. The item is dropped from the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The item exists but cannot be republished (e.g. not a video).
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The item could not be resolved or downloaded.
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Per-item publish failure. The entry goes back to the front of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

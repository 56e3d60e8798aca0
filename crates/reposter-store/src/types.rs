//! Persisted record types.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format used for every timestamp written to the ledger.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One item staged for upload on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// The reference this entry was selected from.
    pub reference: String,
    /// Local path of the downloaded media.
    pub media_path: PathBuf,
    /// Caption to publish with the media.
    pub caption: String,
    /// Canonical URL of the source post, as reported by the fetcher.
    pub source_url: String,
}

/// A row of the description ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub reference: String,
    pub caption: String,
    pub downloaded_at: NaiveDateTime,
    /// Blank until the item has been published.
    pub uploaded_at: Option<NaiveDateTime>,
}

impl LedgerRow {
    /// Create a row for a freshly downloaded item.
    pub fn downloaded(reference: String, caption: String, at: NaiveDateTime) -> Self {
        Self {
            reference,
            caption,
            downloaded_at: at,
            uploaded_at: None,
        }
    }
}

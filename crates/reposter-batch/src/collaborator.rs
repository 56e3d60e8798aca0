//! Interfaces to the platform.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{FetchError, PublishError};

/// Media and metadata resolved for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Local path of the downloaded media.
    pub media_path: PathBuf,
    pub caption: String,
    /// Canonical URL of the source post.
    pub source_url: String,
}

/// Resolves a reference to local media plus caption.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia, FetchError>;
}

/// Publishes local media with a caption.
///
/// Implementations are retried on failure with no deduplication, so a
/// publish that failed ambiguously may end up posted twice.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, media_path: &Path, caption: &str) -> Result<(), PublishError>;
}

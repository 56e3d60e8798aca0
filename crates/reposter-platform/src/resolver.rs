//! Media resolver: reference URL to local video plus caption.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use reposter_batch::{FetchError, FetchedMedia, Fetcher};

use crate::client::{failure_message, http_client};
use crate::{PlatformError, PostMetadata};

/// Extract the shortcode from a post reference: the last non-empty path
/// segment, ignoring any query or fragment.
pub fn shortcode(reference: &str) -> Option<&str> {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    reference[..end]
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .filter(|segment| !segment.contains(':'))
}

/// Resolves references through the metadata service and downloads videos
/// into `media_dir`.
pub struct MediaResolver {
    http: Client,
    resolver_url: String,
    media_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(
        resolver_url: impl Into<String>,
        media_dir: impl Into<PathBuf>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            http: http_client()?,
            resolver_url: resolver_url.into().trim_end_matches('/').to_string(),
            media_dir: media_dir.into(),
        })
    }

    /// First free `{code}.mp4`, `{code}-1.mp4`, ... path in the media dir.
    async fn free_media_path(&self, code: &str) -> Result<PathBuf, FetchError> {
        let mut n = 0u32;
        loop {
            let name = if n == 0 {
                format!("{code}.mp4")
            } else {
                format!("{code}-{n}.mp4")
            };
            let candidate = self.media_dir.join(name);
            let taken = tokio::fs::try_exists(&candidate)
                .await
                .map_err(|e| FetchError::Failed(e.to_string()))?;
            if !taken {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Fetch metadata for a shortcode.
    #[tracing::instrument(skip(self))]
    pub async fn metadata(&self, shortcode: &str) -> Result<PostMetadata, PlatformError> {
        let url = format!("{}/v1/posts/{}", self.resolver_url, shortcode);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(PlatformError::InvalidResponse(format!(
                "metadata lookup failed ({})",
                failure_message(response).await
            )));
        }

        Ok(response.json().await?)
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// A partial file is removed on failure.
    #[tracing::instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, PlatformError> {
        let mut response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PlatformError::InvalidResponse(format!(
                "download failed ({})",
                failure_message(response).await
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = async {
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.sync_all().await?;
            Ok::<_, PlatformError>(written)
        }
        .await;

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(dest).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "failed to remove partial download");
                }
            }
        }
        result
    }

    /// Resolve a reference to downloaded media.
    pub async fn resolve(&self, reference: &str) -> Result<FetchedMedia, FetchError> {
        let code = shortcode(reference)
            .ok_or_else(|| FetchError::Failed(format!("no shortcode in {reference:?}")))?;

        let meta = self
            .metadata(code)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        if !meta.is_video {
            return Err(FetchError::NotEligible(format!("{code} is not a video")));
        }
        let video_url = meta
            .video_url
            .as_deref()
            .ok_or_else(|| FetchError::Failed(format!("{code} has no video url")))?;

        // Entries of one batch may share a reference; each gets its own file.
        let media_path = self.free_media_path(code).await?;
        let size = self
            .download(video_url, &media_path)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        debug!(shortcode = code, size, "downloaded media");

        Ok(FetchedMedia {
            media_path,
            caption: meta.caption_or_default(),
            source_url: meta
                .permalink
                .clone()
                .unwrap_or_else(|| reference.to_string()),
        })
    }
}

#[async_trait]
impl Fetcher for MediaResolver {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia, FetchError> {
        self.resolve(reference).await
    }
}

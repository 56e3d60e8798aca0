//! Wire types.

use serde::{Deserialize, Serialize};

/// Caption used when a post has none.
pub const DEFAULT_CAPTION: &str = "No description available";

/// Session returned by `POST /v1/session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
}

/// Post metadata returned by `GET /v1/posts/{shortcode}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetadata {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

impl PostMetadata {
    /// The caption, or [`DEFAULT_CAPTION`] when missing or blank.
    pub fn caption_or_default(&self) -> String {
        match &self.caption {
            Some(c) if !c.trim().is_empty() => c.clone(),
            _ => DEFAULT_CAPTION.to_string(),
        }
    }
}

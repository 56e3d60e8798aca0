//! Error types for the platform clients.

use thiserror::Error;

/// Errors that can occur when talking to the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Authentication failed or no session is held.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing local media failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered with an unexpected status or body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

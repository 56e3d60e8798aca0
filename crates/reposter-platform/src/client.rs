//! Publishing client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use reposter_batch::{PublishError, Publisher};

use crate::{PlatformError, Session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Build an HTTP client with the connect and request timeouts.
pub(crate) fn http_client() -> Result<Client, PlatformError> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Read a non-2xx response into an error message.
pub(crate) async fn failure_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.is_empty() => format!("{status}: {text}"),
        Ok(_) => status.to_string(),
        Err(e) => format!("{status}: failed to read response: {e}"),
    }
}

/// Client for the publishing API.
pub struct PlatformClient {
    http: Client,
    api_url: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl PlatformClient {
    /// Create a client for the given API base URL.
    pub fn new(api_url: impl Into<String>) -> Result<Self, PlatformError> {
        Ok(Self {
            http: http_client()?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Authenticate and keep the bearer token for later publishes.
    ///
    /// Blank credentials are rejected without contacting the server.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<(), PlatformError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,
        }

        if username.trim().is_empty() || password.is_empty() {
            return Err(PlatformError::Auth("missing credentials".to_string()));
        }

        let url = format!("{}/v1/session", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Auth(format!(
                "login failed ({})",
                failure_message(response).await
            )));
        }

        let session: Session = response.json().await?;
        info!("authenticated with publishing API");

        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn token(&self) -> Result<String, PlatformError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or_else(|| PlatformError::Auth("not authenticated".to_string()))
    }

    /// Upload a clip with its caption.
    #[tracing::instrument(skip(self, media_path, caption), fields(media = %media_path.display()))]
    pub async fn publish_clip(&self, media_path: &Path, caption: &str) -> Result<(), PlatformError> {
        let token = self.token().await?;

        let bytes = tokio::fs::read(media_path).await?;
        let file_name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.mp4".to_string());
        let size = bytes.len();

        let video = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")?;
        let form = Form::new()
            .part("video", video)
            .text("caption", caption.to_string());

        let url = format!("{}/v1/clips", self.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Auth(failure_message(response).await));
        }
        if !status.is_success() {
            return Err(PlatformError::InvalidResponse(format!(
                "publish rejected ({})",
                failure_message(response).await
            )));
        }

        debug!(size, "clip uploaded");
        Ok(())
    }
}

#[async_trait]
impl Publisher for PlatformClient {
    async fn publish(&self, media_path: &Path, caption: &str) -> Result<(), PublishError> {
        self.publish_clip(media_path, caption)
            .await
            .map_err(|e| PublishError(e.to_string()))
    }
}

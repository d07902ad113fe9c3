//! Raw byte transfer to and from presigned storage URLs.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace};

use super::error::TransportError;

/// Content type used for every image upload.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fetches and uploads image bytes. Mockable seam for sessions.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Download the bytes behind a presigned URL.
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError>;

    /// Send raw bytes to a presigned URL as `application/octet-stream`.
    async fn upload(&self, url: &str, bytes: Bytes) -> Result<(), TransportError>;
}

/// reqwest-backed transport. No retries; callers own retry policy.
#[derive(Debug, Clone)]
pub struct HttpImageTransport {
    client: reqwest::Client,
}

impl HttpImageTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url, TransportError> {
    reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))
}

async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ImageTransport for HttpImageTransport {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError> {
        debug!("fetching image: {}", url);
        let response = self.client.get(parse_url(url)?).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        trace!("fetched image size: {}", bytes.len());
        Ok(bytes)
    }

    async fn upload(&self, url: &str, bytes: Bytes) -> Result<(), TransportError> {
        debug!("uploading {} bytes to {}", bytes.len(), url);
        let response = self
            .client
            .put(parse_url(url)?)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

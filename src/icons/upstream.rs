//! HTTP access to the remote icon sources.
//!
//! Everything that leaves the process goes through the [`Upstream`] trait so
//! the catalog and import pipeline can be exercised against canned responses.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-request timeout for every outbound fetch.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT: &str = concat!(
    "kiss-startpage/",
    env!("CARGO_PKG_VERSION"),
    " (+selfhst-icons)"
);
const ACCEPT: &str = "application/json, image/svg+xml, image/png;q=0.9, */*;q=0.8";

/// Transport-level failure (DNS, connect, timeout, body read).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type from the Content-Type header: lowercased, parameters dropped.
    pub fn media_type(&self) -> Option<String> {
        let raw = self.content_type.as_deref()?;
        let media = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if media.is_empty() {
            None
        } else {
            Some(media)
        }
    }
}

/// Fetches a URL and returns its status, content type and body.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, TransportError>;
}

/// `reqwest`-backed upstream used in production.
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, TransportError> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_params() {
        let resp = UpstreamResponse {
            status: 200,
            content_type: Some("Image/SVG+XML; charset=utf-8".to_string()),
            body: Bytes::new(),
        };
        assert_eq!(resp.media_type().as_deref(), Some("image/svg+xml"));
        assert!(resp.is_success());
    }

    #[test]
    fn test_media_type_missing() {
        let resp = UpstreamResponse {
            status: 404,
            content_type: Some("  ".to_string()),
            body: Bytes::new(),
        };
        assert!(resp.media_type().is_none());
        assert!(!resp.is_success());
    }
}

//! Lorem Picsum list API (`https://picsum.photos/v2/list`).
//!
//! Free, no API key. Upstream pages are 1-based; the feed's zero-based page
//! index is shifted by one on the wire.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{map_descriptors, PhotoSource, RawPhoto, SourceError};
use crate::models::Photo;

/// Default Picsum endpoint.
pub const DEFAULT_BASE_URL: &str = "https://picsum.photos";

#[derive(Debug, Clone)]
pub struct PicsumConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PicsumConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct PicsumSource {
    client: reqwest::Client,
    config: PicsumConfig,
}

impl PicsumSource {
    /// Share an existing client (connection pool) with other components.
    pub fn with_client(client: reqwest::Client, config: PicsumConfig) -> Self {
        Self { client, config }
    }

    fn list_url(&self) -> String {
        format!("{}/v2/list", self.config.base_url.trim_end_matches('/'))
    }
}

/// Build the HTTP client with the configured timeouts.
pub fn build_client(config: &PicsumConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
        .context("Failed to create HTTP client")
}

fn classify(err: reqwest::Error) -> SourceError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        SourceError::Transport(err.to_string())
    } else if err.is_decode() || err.is_status() || err.is_body() {
        SourceError::Protocol(err.to_string())
    } else {
        SourceError::Unknown(err.to_string())
    }
}

#[async_trait]
impl PhotoSource for PicsumSource {
    async fn fetch(&self, page: u32, limit: u32) -> Result<Vec<Photo>, SourceError> {
        let url = self.list_url();
        debug!(%url, page, limit, "Requesting photo list");

        let response = self
            .client
            .get(&url)
            .query(&[("page", page + 1), ("limit", limit)])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, page, "Photo list request rejected");
            return Err(SourceError::Protocol(format!("HTTP {status}")));
        }

        let raws: Vec<RawPhoto> = response.json().await.map_err(classify)?;
        Ok(map_descriptors(&self.config.base_url, raws))
    }

    fn name(&self) -> &'static str {
        "picsum"
    }
}

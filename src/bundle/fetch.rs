//! HTTP retrieval for `url` bundle sources.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Timeout applied to every bundle download
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability to download a bundle body over HTTP(S).
///
/// The resolver relabels any error with the bundle name as [`Error::Fetch`].
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Issue a GET and return the full response body as text
    async fn get(&self, url: &str) -> Result<String>;
}

/// [`HttpFetcher`] backed by reqwest
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Build a fetcher with the default timeout
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

//! Plain HTTP page fetcher
//!
//! Loads pages with reqwest, reading the full body so the measured duration
//! covers the whole transfer. Also serves as the robots.txt source.

use super::{FetchOutcome, PageFetcher};
use crate::admission::RobotsSource;
use crate::error::FetchError;
use crate::pool::PoolEntry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("msc-bench/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`PageFetcher`]
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, timeout })
    }

    fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(timeout.as_millis() as u64)
        } else if error.is_builder() {
            FetchError::InvalidUrl(error.to_string())
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        context: Option<&PoolEntry>,
    ) -> Result<FetchOutcome, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        let timeout = context.map(|c| c.timeout).unwrap_or(self.timeout);

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        let status_code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        Ok(FetchOutcome {
            status_code,
            content_length: Some(body.len() as u64),
        })
    }
}

#[async_trait]
impl RobotsSource for HttpFetcher {
    async fn fetch_robots(&self, origin: &str) -> Result<String> {
        let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned {}", url, response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {}", url))
    }
}

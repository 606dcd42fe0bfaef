//! Task execution
//!
//! This module provides:
//! - The [`PageFetcher`] capability used by every task
//! - A reqwest-based fetcher that also serves robots.txt
//! - The per-level task runner

mod http;
mod task_runner;

pub use http::{HttpFetcher, DEFAULT_USER_AGENT};
pub use task_runner::TaskRunner;

use crate::error::FetchError;
use crate::pool::PoolEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How pages are loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadMode {
    /// Plain HTTP requests, no execution context needed
    #[default]
    Http,
    /// Each task runs inside a pooled, isolated context
    Browser,
}

impl WorkloadMode {
    /// Whether tasks need an entry from the resource pool
    pub fn needs_context(&self) -> bool {
        matches!(self, WorkloadMode::Browser)
    }
}

/// Result of a completed page load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status_code: u16,
    pub content_length: Option<u64>,
}

impl FetchOutcome {
    /// 2xx and 3xx responses count as successful loads
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}

/// Capability that loads one page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load `url`, optionally inside the given execution context
    async fn fetch(
        &self,
        url: &str,
        context: Option<&PoolEntry>,
    ) -> Result<FetchOutcome, FetchError>;
}

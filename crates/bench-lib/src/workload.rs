//! Workload definitions
//!
//! A run's targets come from the configuration or from a pre-generated
//! workload document. Documents are plain JSON and are only read, never
//! executed.

use crate::error::BenchError;
use crate::runner::WorkloadMode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Workload section of the run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default)]
    pub mode: WorkloadMode,
    /// Engine label reported with browser-mode runs
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Batches executed per level
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// Optional JSON workload document replacing `urls`
    #[serde(default)]
    pub document_path: Option<PathBuf>,
}

fn default_engine() -> String {
    "chromium".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_repetitions() -> u32 {
    1
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            mode: WorkloadMode::default(),
            engine: default_engine(),
            headless: default_headless(),
            urls: Vec::new(),
            repetitions: default_repetitions(),
            document_path: None,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.repetitions == 0 {
            return Err(BenchError::InvalidConfig(
                "workload.repetitions must be at least 1".to_string(),
            ));
        }
        if self.engine.trim().is_empty() {
            return Err(BenchError::InvalidConfig(
                "workload.engine must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pre-generated workload: target URLs plus an optional concurrency hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadDocument {
    pub urls: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<u32>,
    /// Free-form parameters carried through to the report
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl WorkloadDocument {
    /// Read and validate a document from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read workload document {}", path.display()))?;
        let document = Self::parse(&content)
            .with_context(|| format!("Invalid workload document {}", path.display()))?;
        Ok(document)
    }

    /// Parse and validate a JSON document
    pub fn parse(content: &str) -> Result<Self, BenchError> {
        let document: Self = serde_json::from_str(content)
            .map_err(|e| BenchError::InvalidConfig(format!("workload document: {}", e)))?;
        document.validate()?;
        Ok(document)
    }

    /// Require at least one http(s) URL and a positive concurrency
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.urls.is_empty() {
            return Err(BenchError::InvalidConfig(
                "workload document has no urls".to_string(),
            ));
        }

        for url in &self.urls {
            let parsed = Url::parse(url).map_err(|e| {
                BenchError::InvalidConfig(format!("workload url {:?}: {}", url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(BenchError::InvalidConfig(format!(
                    "workload url {:?} must use http or https",
                    url
                )));
            }
        }

        if self.concurrency == Some(0) {
            return Err(BenchError::InvalidConfig(
                "workload document concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Source of target URLs discovered from a seed page
///
/// No implementation ships with the harness; runs use configured URLs or a
/// workload document.
#[async_trait]
pub trait UrlDiscovery: Send + Sync {
    async fn discover(&self, seed: &str, limit: usize) -> Result<Vec<String>>;
}

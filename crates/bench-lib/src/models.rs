//! Core data models for the harness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single task attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub duration_ms: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// Build a failed result with the given error message
    pub fn failed(url: impl Into<String>, error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            url: url.into(),
            success: false,
            status_code: None,
            duration_ms,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Task counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub error_rate: f64,
}

/// Latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Host resource snapshot taken after a batch
///
/// `cpu_usage` and `memory_usage` are percentages in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub load_average: [f64; 3],
}

/// Aggregated measurement of one batch at one concurrency level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub level: u32,
    pub timestamp: DateTime<Utc>,
    pub tasks: TaskCounts,
    pub latency_ms: LatencyPercentiles,
    pub host: HostSnapshot,
}

/// Reference latencies captured from the first sample of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl From<&Sample> for Baseline {
    fn from(sample: &Sample) -> Self {
        Self {
            p50: sample.latency_ms.p50,
            p95: sample.latency_ms.p95,
            p99: sample.latency_ms.p99,
        }
    }
}

/// Sticky outcome of degradation detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationVerdict {
    pub detected: bool,
    pub reason: String,
    pub triggering_level: Option<u32>,
    /// Position of the triggering sample in the sample log
    pub sample_index: Option<usize>,
}

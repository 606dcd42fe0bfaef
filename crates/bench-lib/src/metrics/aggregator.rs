//! Sample aggregation
//!
//! Turns one batch of task results plus a host snapshot into a [`Sample`],
//! keeps the ordered sample log and captures the run's baseline.

use super::percentile::latency_percentiles;
use crate::models::{Baseline, HostSnapshot, Sample, TaskCounts, TaskResult};
use chrono::Utc;
use tracing::{debug, info};

/// Builds samples and owns the append-only sample log
#[derive(Debug)]
pub struct MetricsAggregator {
    /// Level whose first sample becomes the baseline
    baseline_level: u32,
    samples: Vec<Sample>,
    baseline: Option<Baseline>,
}

impl MetricsAggregator {
    /// Create an aggregator for a plan whose first level is `baseline_level`
    pub fn new(baseline_level: u32) -> Self {
        Self {
            baseline_level,
            samples: Vec::new(),
            baseline: None,
        }
    }

    /// Aggregate one batch and append it to the log
    pub fn add_sample(&mut self, level: u32, results: &[TaskResult], host: HostSnapshot) -> Sample {
        let tasks = count_tasks(results);
        let latency_ms = latency_percentiles(
            results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.duration_ms),
        );

        let sample = Sample {
            level,
            timestamp: Utc::now(),
            tasks,
            latency_ms,
            host,
        };

        if self.baseline.is_none() && level == self.baseline_level {
            let baseline = Baseline::from(&sample);
            info!(
                level = level,
                p50_ms = baseline.p50,
                p95_ms = baseline.p95,
                p99_ms = baseline.p99,
                "Baseline captured"
            );
            self.baseline = Some(baseline);
        }

        debug!(
            level = level,
            attempted = tasks.attempted,
            failed = tasks.failed,
            p95_ms = latency_ms.p95,
            "Sample recorded"
        );

        self.samples.push(sample.clone());
        sample
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    /// Samples in the order they were recorded
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Consume the aggregator, returning the sample log
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

fn count_tasks(results: &[TaskResult]) -> TaskCounts {
    let attempted = results.len();
    let successful = results.iter().filter(|r| r.success).count();
    let failed = attempted - successful;
    let error_rate = if attempted == 0 {
        0.0
    } else {
        failed as f64 / attempted as f64
    };

    TaskCounts {
        attempted,
        successful,
        failed,
        error_rate,
    }
}

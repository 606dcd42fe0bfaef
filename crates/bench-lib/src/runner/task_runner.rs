//! Per-level task execution
//!
//! Spawns one worker per unit of concurrency, each gated by the safety gate,
//! and waits for all of them before returning the level's results.

use super::{PageFetcher, WorkloadMode};
use crate::admission::SafetyGate;
use crate::models::TaskResult;
use crate::observability::BenchMetrics;
use crate::pool::ResourcePool;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Error recorded for tasks refused by the safety gate
pub const SAFETY_LIMIT_ERROR: &str = "Safety limit exceeded";

/// Everything a worker needs, cloned into each spawned task
#[derive(Clone)]
struct Worker {
    gate: Arc<SafetyGate>,
    pool: Arc<ResourcePool>,
    fetcher: Arc<dyn PageFetcher>,
    mode: WorkloadMode,
    metrics: BenchMetrics,
}

impl Worker {
    async fn run(self, url: String) -> TaskResult {
        let start = Instant::now();

        let _permit = match self.gate.admit(&url).await {
            Ok(permit) => permit,
            Err(_) => return TaskResult::failed(url, SAFETY_LIMIT_ERROR, 0.0),
        };

        let lease = if self.mode.needs_context() {
            match self.pool.acquire().await {
                Ok(lease) => {
                    self.metrics.set_pool_busy(self.pool.stats().busy as i64);
                    Some(lease)
                }
                Err(e) => {
                    return TaskResult::failed(url, e.to_string(), elapsed_ms(start));
                }
            }
        } else {
            None
        };

        let outcome = self
            .fetcher
            .fetch(&url, lease.as_ref().map(|lease| lease.entry()))
            .await;
        drop(lease);

        let duration_ms = elapsed_ms(start);
        match outcome {
            Ok(outcome) if outcome.is_success() => TaskResult {
                url,
                success: true,
                status_code: Some(outcome.status_code),
                duration_ms,
                error: None,
                timestamp: Utc::now(),
            },
            Ok(outcome) => TaskResult {
                url,
                success: false,
                status_code: Some(outcome.status_code),
                duration_ms,
                error: Some(format!("HTTP {}", outcome.status_code)),
                timestamp: Utc::now(),
            },
            Err(e) => {
                debug!(url = %url, error = %e, "Fetch failed");
                TaskResult::failed(url, e.to_string(), duration_ms)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Runs one concurrency level at a time
pub struct TaskRunner {
    worker: Worker,
}

impl TaskRunner {
    pub fn new(
        gate: Arc<SafetyGate>,
        pool: Arc<ResourcePool>,
        fetcher: Arc<dyn PageFetcher>,
        mode: WorkloadMode,
    ) -> Self {
        Self {
            worker: Worker {
                gate,
                pool,
                fetcher,
                mode,
                metrics: BenchMetrics::new(),
            },
        }
    }

    /// Run `level` parallel tasks over `urls` (round-robin) and collect every result
    ///
    /// Results are returned in spawn order, though nothing depends on it.
    pub async fn run_level(&self, urls: &[String], level: u32) -> Vec<TaskResult> {
        if urls.is_empty() {
            return Vec::new();
        }

        let handles: Vec<_> = (0..level as usize)
            .map(|i| {
                let url = urls[i % urls.len()].clone();
                let worker = self.worker.clone();
                let handle = tokio::spawn(worker.run(url.clone()));
                (url, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(url = %url, error = %e, "Worker did not complete");
                    TaskResult::failed(url, format!("worker failed: {}", e), 0.0)
                }
            };
            self.worker.metrics.record_task(&result);
            results.push(result);
        }

        if self.worker.mode.needs_context() {
            self.worker
                .metrics
                .set_pool_busy(self.worker.pool.stats().busy as i64);
        }

        results
    }

    pub fn gate(&self) -> &Arc<SafetyGate> {
        &self.worker.gate
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.worker.pool
    }

    pub fn mode(&self) -> WorkloadMode {
        self.worker.mode
    }
}

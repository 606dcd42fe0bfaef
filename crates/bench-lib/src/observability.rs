//! Observability infrastructure for the benchmark harness
//!
//! Provides:
//! - Prometheus metrics (task outcomes and latency, admission denials, ramp progress)
//! - Structured JSON logging with tracing

use crate::models::{DegradationVerdict, Sample, TaskResult};
use crate::ramp::StopReason;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Buckets for individual task latency (in seconds)
const TASK_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Buckets for whole-level duration (in seconds)
const LEVEL_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BenchMetricsInner> = OnceLock::new();

struct BenchMetricsInner {
    tasks_total: IntCounterVec,
    task_duration_seconds: Histogram,
    admission_denied_total: IntCounterVec,
    pool_busy: IntGauge,
    current_level: IntGauge,
    samples_recorded: IntCounter,
    level_duration_seconds: Histogram,
    degraded: IntGauge,
    msc: IntGauge,
}

impl BenchMetricsInner {
    fn new() -> Self {
        Self {
            tasks_total: register_int_counter_vec!(
                "msc_bench_tasks_total",
                "Task attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register tasks_total"),

            task_duration_seconds: register_histogram!(
                "msc_bench_task_duration_seconds",
                "Wall-clock duration of successful tasks",
                TASK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register task_duration_seconds"),

            admission_denied_total: register_int_counter_vec!(
                "msc_bench_admission_denied_total",
                "Tasks refused by the safety gate",
                &["reason"]
            )
            .expect("Failed to register admission_denied_total"),

            pool_busy: register_int_gauge!(
                "msc_bench_pool_busy",
                "Execution contexts currently leased"
            )
            .expect("Failed to register pool_busy"),

            current_level: register_int_gauge!(
                "msc_bench_current_level",
                "Concurrency level currently being executed"
            )
            .expect("Failed to register current_level"),

            samples_recorded: register_int_counter!(
                "msc_bench_samples_recorded_total",
                "Samples appended to the run log"
            )
            .expect("Failed to register samples_recorded"),

            level_duration_seconds: register_histogram!(
                "msc_bench_level_duration_seconds",
                "Time spent executing all batches of a level",
                LEVEL_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register level_duration_seconds"),

            degraded: register_int_gauge!(
                "msc_bench_degraded",
                "1 once degradation has been detected in the current run"
            )
            .expect("Failed to register degraded"),

            msc: register_int_gauge!(
                "msc_bench_max_sustainable_concurrency",
                "Maximum sustainable concurrency of the last finished run"
            )
            .expect("Failed to register msc"),
        }
    }
}

/// Benchmark metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct BenchMetrics {
    _private: (),
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BenchMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BenchMetricsInner {
        GLOBAL_METRICS.get_or_init(BenchMetricsInner::new)
    }

    /// Count a finished task and, when it succeeded, its latency
    pub fn record_task(&self, result: &TaskResult) {
        let outcome = if result.success { "success" } else { "failure" };
        self.inner().tasks_total.with_label_values(&[outcome]).inc();
        if result.success {
            self.inner()
                .task_duration_seconds
                .observe(result.duration_ms / 1000.0);
        }
    }

    pub fn inc_admission_denied(&self, reason: &str) {
        self.inner()
            .admission_denied_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn set_pool_busy(&self, busy: i64) {
        self.inner().pool_busy.set(busy);
    }

    pub fn set_current_level(&self, level: u32) {
        self.inner().current_level.set(i64::from(level));
    }

    pub fn inc_samples_recorded(&self) {
        self.inner().samples_recorded.inc();
    }

    pub fn observe_level_duration(&self, duration_secs: f64) {
        self.inner().level_duration_seconds.observe(duration_secs);
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.inner().degraded.set(i64::from(degraded));
    }

    pub fn set_msc(&self, msc: u32) {
        self.inner().msc.set(i64::from(msc));
    }
}

/// Structured logger for run events
///
/// Every event carries the run id so interleaved runs can be told apart.
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_run_started(&self, strategy: &str, levels: &[u32], url_count: usize) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            strategy = %strategy,
            levels = ?levels,
            url_count = url_count,
            "Benchmark run started"
        );
    }

    pub fn log_level_completed(&self, sample: &Sample, duration: Duration) {
        info!(
            event = "level_completed",
            run_id = %self.run_id,
            level = sample.level,
            attempted = sample.tasks.attempted,
            failed = sample.tasks.failed,
            error_rate = sample.tasks.error_rate,
            p50_ms = sample.latency_ms.p50,
            p95_ms = sample.latency_ms.p95,
            p99_ms = sample.latency_ms.p99,
            cpu_usage = sample.host.cpu_usage,
            memory_usage = sample.host.memory_usage,
            duration_ms = duration.as_millis() as u64,
            "Level completed"
        );
    }

    /// Log the first detection; `repetition` is 1-based within the level
    pub fn log_degradation(&self, verdict: &DegradationVerdict, repetition: u32) {
        warn!(
            event = "degradation_detected",
            run_id = %self.run_id,
            level = ?verdict.triggering_level,
            sample_index = ?verdict.sample_index,
            repetition = repetition,
            reason = %verdict.reason,
            "Degradation detected"
        );
    }

    pub fn log_run_finished(
        &self,
        stop_reason: StopReason,
        msc: u32,
        samples: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "run_finished",
            run_id = %self.run_id,
            stop_reason = ?stop_reason,
            msc = msc,
            samples = samples,
            elapsed_secs = elapsed.as_secs_f64(),
            "Benchmark run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    #[test]
    fn test_bench_metrics_exposed() {
        let metrics = BenchMetrics::new();
        metrics.record_task(&TaskResult::failed("https://example.com/", "boom", 0.0));
        metrics.inc_admission_denied("rate");
        metrics.set_pool_busy(3);
        metrics.set_current_level(8);
        metrics.inc_samples_recorded();
        metrics.observe_level_duration(1.5);
        metrics.set_degraded(false);
        metrics.set_msc(4);

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("msc_bench_tasks_total"));
        assert!(text.contains("msc_bench_admission_denied_total"));
        assert!(text.contains("msc_bench_max_sustainable_concurrency"));
    }

    #[test]
    fn test_handles_share_registry() {
        let a = BenchMetrics::new();
        let b = a.clone();
        let before = a.inner().samples_recorded.get();
        b.inc_samples_recorded();
        assert!(a.inner().samples_recorded.get() > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("run-42");
        assert_eq!(logger.run_id(), "run-42");
    }
}

//! Ramp controller
//!
//! Drives the run: for each planned level it executes the configured number
//! of batches, records samples, consults the degradation detector and either
//! stops or waits an adaptive cooldown before the next level.

use super::plan::RampPlan;
use crate::detector::DegradationDetector;
use crate::health::{components, HealthRegistry};
use crate::host::HostSampler;
use crate::metrics::MetricsAggregator;
use crate::models::{Baseline, DegradationVerdict, HostSnapshot, Sample};
use crate::observability::{BenchMetrics, StructuredLogger};
use crate::runner::TaskRunner;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Run-level settings for the controller
#[derive(Debug, Clone)]
pub struct RampConfig {
    /// Target URLs, assigned round-robin to workers
    pub urls: Vec<String>,
    /// Batches per level
    pub repetitions: u32,
    /// Overall deadline, checked between levels
    pub max_runtime: Duration,
    /// Levels shorter than this are padded by the cooldown
    pub min_level_duration: Duration,
    /// Shortest cooldown between levels
    pub cooldown_floor: Duration,
    /// Cooldown as a fraction of the level duration
    pub cooldown_fraction: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            repetitions: 1,
            max_runtime: Duration::from_secs(30 * 60),
            min_level_duration: Duration::from_secs(10),
            cooldown_floor: Duration::from_secs(1),
            cooldown_fraction: 0.1,
        }
    }
}

/// Where the controller is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "index")]
pub enum RampState {
    NotStarted,
    RunningLevel(usize),
    Cooldown(usize),
    StoppedDegradation,
    StoppedTimeLimit,
    Interrupted,
    Completed,
}

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every planned level ran without degradation
    Completed,
    Degradation,
    TimeLimit,
    Interrupted,
}

/// Live progress published while the run is in flight
#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub state: RampState,
    pub current_level: Option<u32>,
    pub samples_recorded: usize,
    pub latest: Option<Sample>,
    pub degraded: bool,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            state: RampState::NotStarted,
            current_level: None,
            samples_recorded: 0,
            latest: None,
            degraded: false,
        }
    }
}

/// Everything the run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub planned_levels: Vec<u32>,
    pub levels_executed: Vec<u32>,
    pub samples: Vec<Sample>,
    pub baseline: Option<Baseline>,
    pub verdict: DegradationVerdict,
    pub msc: u32,
    pub stop_reason: StopReason,
}

/// Wait before the next level
///
/// Short levels are padded up to `min_level_duration`; longer ones rest for a
/// fraction of their duration. Never below the floor, and cut to a quarter of
/// the remaining time when the deadline is close.
pub fn adaptive_wait(
    level_duration: Duration,
    remaining: Duration,
    config: &RampConfig,
) -> Duration {
    let wait = if level_duration < config.min_level_duration {
        (config.min_level_duration - level_duration).max(config.cooldown_floor)
    } else {
        Duration::try_from_secs_f64(level_duration.as_secs_f64() * config.cooldown_fraction)
            .unwrap_or(Duration::ZERO)
            .max(config.cooldown_floor)
    };

    if remaining < wait.saturating_mul(4) {
        wait.min(remaining / 4)
    } else {
        wait
    }
}

/// Top-level ramp loop
pub struct RampController {
    plan: RampPlan,
    config: RampConfig,
    runner: TaskRunner,
    sampler: Arc<dyn HostSampler>,
    detector: DegradationDetector,
    logger: StructuredLogger,
    metrics: BenchMetrics,
    health: Option<HealthRegistry>,
    progress: watch::Sender<RunProgress>,
    state: RampState,
}

impl RampController {
    pub fn new(
        plan: RampPlan,
        config: RampConfig,
        runner: TaskRunner,
        sampler: Arc<dyn HostSampler>,
        detector: DegradationDetector,
    ) -> Self {
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            plan,
            config,
            runner,
            sampler,
            detector,
            logger: StructuredLogger::new("msc-bench"),
            metrics: BenchMetrics::new(),
            health: None,
            progress,
            state: RampState::NotStarted,
        }
    }

    /// Report component health into the given registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Receiver of live progress updates
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    fn transition(&mut self, state: RampState) {
        self.state = state;
        self.progress.send_modify(|progress| progress.state = state);
    }

    /// Execute the plan until it completes, degrades, runs out of time or is interrupted
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.max_runtime)
            .unwrap_or_else(|| far_future(started));

        let mut aggregator = MetricsAggregator::new(self.plan.first_level());
        let mut levels_executed = Vec::new();
        let mut stop_reason = StopReason::Completed;

        self.logger.log_run_started(
            &self.plan.strategy().to_string(),
            self.plan.levels(),
            self.config.urls.len(),
        );
        self.metrics.set_degraded(false);
        if let Some(health) = &self.health {
            health.set_healthy(components::RUNNER).await;
        }
        self.prime_sampler().await;

        let levels = self.plan.levels().to_vec();
        for (index, level) in levels.iter().copied().enumerate() {
            if Instant::now() >= deadline {
                warn!(
                    level = level,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Max runtime reached, stopping before level"
                );
                self.transition(RampState::StoppedTimeLimit);
                stop_reason = StopReason::TimeLimit;
                break;
            }

            self.transition(RampState::RunningLevel(index));
            self.progress
                .send_modify(|progress| progress.current_level = Some(level));
            self.metrics.set_current_level(level);

            let level_start = Instant::now();
            for repetition in 0..self.config.repetitions.max(1) {
                let results = self.runner.run_level(&self.config.urls, level).await;
                let host = self.sample_host().await;
                let sample = aggregator.add_sample(level, &results, host);
                self.metrics.inc_samples_recorded();

                if self.detector.check(&sample, aggregator.baseline().as_ref()) {
                    self.metrics.set_degraded(true);
                    self.logger
                        .log_degradation(self.detector.verdict(), repetition + 1);
                }

                let degraded = self.detector.is_detected();
                let recorded = aggregator.samples().len();
                self.progress.send_modify(|progress| {
                    progress.samples_recorded = recorded;
                    progress.latest = Some(sample.clone());
                    progress.degraded = degraded;
                });

                if degraded {
                    break;
                }
            }

            let level_duration = level_start.elapsed();
            levels_executed.push(level);
            self.metrics.observe_level_duration(level_duration.as_secs_f64());
            if let Some(sample) = aggregator.latest() {
                self.logger.log_level_completed(sample, level_duration);
            }

            if self.detector.is_detected() {
                self.transition(RampState::StoppedDegradation);
                stop_reason = StopReason::Degradation;
                break;
            }

            if index + 1 == levels.len() {
                break;
            }

            let wait = adaptive_wait(
                level_duration,
                deadline.saturating_duration_since(Instant::now()),
                &self.config,
            );
            self.transition(RampState::Cooldown(index));
            if wait_or_shutdown(wait, &mut shutdown).await {
                info!(level = level, "Shutdown requested, ending run");
                self.transition(RampState::Interrupted);
                stop_reason = StopReason::Interrupted;
                break;
            }
        }

        let verdict = self.detector.verdict().clone();
        let msc = self.detector.compute_msc(aggregator.samples());
        let baseline = aggregator.baseline();
        let samples = aggregator.into_samples();

        self.runner.pool().cleanup();
        self.metrics.set_msc(msc);
        if let (Some(health), true) = (&self.health, verdict.detected) {
            health
                .set_degraded(components::RUNNER, verdict.reason.clone())
                .await;
        }
        self.transition(RampState::Completed);
        self.logger
            .log_run_finished(stop_reason, msc, samples.len(), started.elapsed());

        RunReport {
            started_at,
            elapsed_secs: started.elapsed().as_secs_f64(),
            planned_levels: levels,
            levels_executed,
            samples,
            baseline,
            verdict,
            msc,
            stop_reason,
        }
    }

    async fn prime_sampler(&self) {
        if let Err(e) = self.sampler.prime().await {
            warn!(error = %e, "Host sampler priming failed");
            if let Some(health) = &self.health {
                health
                    .set_degraded(components::HOST_SAMPLER, e.to_string())
                    .await;
            }
        }
    }

    async fn sample_host(&self) -> HostSnapshot {
        match self.sampler.sample().await {
            Ok(snapshot) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::HOST_SAMPLER).await;
                }
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Host sampling failed, recording idle host");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::HOST_SAMPLER, e.to_string())
                        .await;
                }
                HostSnapshot::default()
            }
        }
    }
}

/// Deadline used when the configured runtime does not fit in an `Instant`
fn far_future(from: Instant) -> Instant {
    from + Duration::from_secs(86_400 * 365 * 30)
}

/// Sleep for `wait`; returns true if shutdown was signalled first
async fn wait_or_shutdown(wait: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    let timer = sleep(wait);
    tokio::pin!(timer);

    let closed = tokio::select! {
        _ = &mut timer => return false,
        signal = shutdown.recv() => matches!(signal, Err(RecvError::Closed)),
    };

    if closed {
        // every sender is gone, nobody can ask us to stop
        timer.await;
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{SafetyConfig, SafetyGate};
    use crate::detector::Thresholds;
    use crate::error::FetchError;
    use crate::host::NullHostSampler;
    use crate::pool::{PoolConfig, PoolEntry, ResourcePool};
    use crate::ramp::RampStrategy;
    use crate::runner::{FetchOutcome, PageFetcher, WorkloadMode};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fetcher whose latency grows with the number of requests in flight
    struct ContendedFetcher {
        unit: Duration,
        in_flight: AtomicUsize,
    }

    impl ContendedFetcher {
        fn new(unit: Duration) -> Self {
            Self {
                unit,
                in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ContendedFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _context: Option<&PoolEntry>,
        ) -> Result<FetchOutcome, FetchError> {
            let position = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            sleep(self.unit * position as u32).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchOutcome {
                status_code: 200,
                content_length: None,
            })
        }
    }

    /// Sampler replaying a fixed list of CPU readings
    struct ScriptedSampler {
        cpu: Mutex<VecDeque<f64>>,
        primed: AtomicUsize,
    }

    impl ScriptedSampler {
        fn new(cpu: &[f64]) -> Self {
            Self {
                cpu: Mutex::new(cpu.iter().copied().collect()),
                primed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HostSampler for ScriptedSampler {
        async fn prime(&self) -> anyhow::Result<()> {
            self.primed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn sample(&self) -> anyhow::Result<HostSnapshot> {
            let cpu = self
                .cpu
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no more readings"))?;
            Ok(HostSnapshot {
                cpu_usage: cpu,
                ..Default::default()
            })
        }
    }

    fn fast_config(urls: &[&str]) -> RampConfig {
        RampConfig {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            repetitions: 1,
            max_runtime: Duration::from_secs(60),
            min_level_duration: Duration::ZERO,
            cooldown_floor: Duration::ZERO,
            cooldown_fraction: 0.0,
        }
    }

    fn controller(
        levels: Vec<u32>,
        config: RampConfig,
        fetcher: Arc<dyn PageFetcher>,
        sampler: Arc<dyn HostSampler>,
        thresholds: Thresholds,
    ) -> RampController {
        let gate = Arc::new(SafetyGate::new(
            SafetyConfig {
                rps: 10_000,
                robots_respect: false,
                ..Default::default()
            },
            None,
        ));
        let pool = Arc::new(ResourcePool::new(PoolConfig::default()));
        let runner = TaskRunner::new(gate, pool, fetcher, WorkloadMode::Http);
        let plan = RampPlan::new(RampStrategy::Custom, levels).unwrap();
        RampController::new(
            plan,
            config,
            runner,
            sampler,
            DegradationDetector::new(thresholds),
        )
    }

    #[tokio::test]
    async fn test_latency_degradation_stops_ramp() {
        let (_tx, rx) = broadcast::channel(1);
        let ramp = controller(
            vec![1, 2, 4],
            fast_config(&["https://example.com/"]),
            Arc::new(ContendedFetcher::new(Duration::from_millis(20))),
            Arc::new(NullHostSampler),
            Thresholds {
                latency_multiplier: 2.5,
                ..Default::default()
            },
        );

        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::Degradation);
        assert!(report.verdict.detected);
        assert!(report.verdict.reason.contains("p95"));
        assert_eq!(report.verdict.triggering_level, Some(4));
        assert_eq!(report.levels_executed, vec![1, 2, 4]);
        assert_eq!(report.msc, 2);
        assert!(report.baseline.is_some());
    }

    #[tokio::test]
    async fn test_completes_without_degradation() {
        let (_tx, rx) = broadcast::channel(1);
        let ramp = controller(
            vec![1, 4, 2],
            fast_config(&["https://a.example/", "https://b.example/"]),
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(NullHostSampler),
            Thresholds {
                latency_multiplier: 1000.0,
                ..Default::default()
            },
        );
        let progress = ramp.subscribe();

        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::Completed);
        assert!(!report.verdict.detected);
        assert_eq!(report.msc, 4);
        assert_eq!(report.samples.len(), 3);
        let levels: Vec<u32> = report.samples.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![1, 4, 2]);
        assert_eq!(report.samples[1].tasks.attempted, 4);

        let last = progress.borrow().clone();
        assert_eq!(last.state, RampState::Completed);
        assert_eq!(last.samples_recorded, 3);
    }

    #[tokio::test]
    async fn test_cpu_degradation_at_second_level() {
        let (_tx, rx) = broadcast::channel(1);
        let sampler = Arc::new(ScriptedSampler::new(&[20.0, 95.0, 10.0, 10.0]));
        let ramp = controller(
            vec![1, 2, 4, 8],
            fast_config(&["https://example.com/"]),
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            sampler.clone(),
            Thresholds {
                latency_multiplier: 1000.0,
                ..Default::default()
            },
        );

        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::Degradation);
        assert_eq!(report.levels_executed, vec![1, 2]);
        assert!(report.verdict.reason.contains("CPU"));
        assert_eq!(report.msc, 1);
        // primed once before the first level, not per sample
        assert_eq!(sampler.primed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_time_limit_checked_before_level() {
        let (_tx, rx) = broadcast::channel(1);
        let mut config = fast_config(&["https://example.com/"]);
        config.max_runtime = Duration::ZERO;

        let ramp = controller(
            vec![1, 2],
            config,
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(NullHostSampler),
            Thresholds::default(),
        );

        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::TimeLimit);
        assert!(report.samples.is_empty());
        assert_eq!(report.msc, 0);
    }

    #[tokio::test]
    async fn test_repetitions_and_early_break() {
        let (_tx, rx) = broadcast::channel(1);
        let mut config = fast_config(&["https://example.com/"]);
        config.repetitions = 3;

        let ramp = controller(
            vec![1, 2],
            config,
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(ScriptedSampler::new(&[10.0, 10.0, 10.0, 10.0, 99.0, 10.0])),
            Thresholds {
                latency_multiplier: 1000.0,
                ..Default::default()
            },
        );

        let report = ramp.run(rx).await;

        let levels: Vec<u32> = report.samples.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![1, 1, 1, 2, 2]);
        assert_eq!(report.verdict.sample_index, Some(4));
        assert_eq!(report.msc, 1);
    }

    #[tokio::test]
    async fn test_sampler_failure_records_idle_host() {
        let (_tx, rx) = broadcast::channel(1);
        let health = HealthRegistry::new();
        health.register(components::HOST_SAMPLER).await;

        let ramp = controller(
            vec![1],
            fast_config(&["https://example.com/"]),
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(ScriptedSampler::new(&[])),
            Thresholds::default(),
        )
        .with_health(health.clone());

        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::Completed);
        assert_eq!(report.samples[0].host, HostSnapshot::default());
        let status = health.health().await;
        assert_eq!(
            status.components[components::HOST_SAMPLER].status,
            crate::health::ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_empty_url_list_yields_empty_samples() {
        let (_tx, rx) = broadcast::channel(1);
        let ramp = controller(
            vec![1, 2],
            fast_config(&[]),
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(NullHostSampler),
            Thresholds::default(),
        );

        let report = ramp.run(rx).await;

        assert_eq!(report.samples.len(), 2);
        for sample in &report.samples {
            assert_eq!(sample.tasks.attempted, 0);
            assert_eq!(sample.tasks.error_rate, 0.0);
        }
        assert_eq!(report.msc, 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_cooldown() {
        let (tx, rx) = broadcast::channel(1);
        let mut config = fast_config(&["https://example.com/"]);
        config.cooldown_floor = Duration::from_secs(30);

        let ramp = controller(
            vec![1, 2, 4],
            config,
            Arc::new(ContendedFetcher::new(Duration::from_millis(1))),
            Arc::new(NullHostSampler),
            Thresholds::default(),
        );

        tx.send(()).unwrap();
        let report = ramp.run(rx).await;

        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.levels_executed, vec![1]);
        assert_eq!(report.msc, 1);
    }

    #[test]
    fn test_adaptive_wait_pads_short_levels() {
        let config = RampConfig {
            min_level_duration: Duration::from_secs(10),
            cooldown_floor: Duration::from_secs(1),
            cooldown_fraction: 0.1,
            ..Default::default()
        };
        let far = Duration::from_secs(3600);

        assert_eq!(
            adaptive_wait(Duration::from_secs(4), far, &config),
            Duration::from_secs(6)
        );
        assert_eq!(
            adaptive_wait(Duration::from_millis(9_500), far, &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_adaptive_wait_fraction_of_long_levels() {
        let config = RampConfig {
            min_level_duration: Duration::from_secs(10),
            cooldown_floor: Duration::from_secs(1),
            cooldown_fraction: 0.1,
            ..Default::default()
        };
        let far = Duration::from_secs(3600);

        assert_eq!(
            adaptive_wait(Duration::from_secs(40), far, &config),
            Duration::from_secs(4)
        );
        assert_eq!(
            adaptive_wait(Duration::from_secs(12), far, &config),
            Duration::from_millis(1200)
        );

        let gentle = RampConfig {
            cooldown_fraction: 0.01,
            ..config
        };
        assert_eq!(
            adaptive_wait(Duration::from_secs(40), far, &gentle),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_adaptive_wait_shrinks_near_deadline() {
        let config = RampConfig {
            min_level_duration: Duration::from_secs(10),
            cooldown_floor: Duration::from_secs(1),
            cooldown_fraction: 0.1,
            ..Default::default()
        };

        assert_eq!(
            adaptive_wait(Duration::from_secs(2), Duration::from_secs(20), &config),
            Duration::from_secs(5)
        );
        assert_eq!(
            adaptive_wait(Duration::from_secs(2), Duration::ZERO, &config),
            Duration::ZERO
        );
    }
}

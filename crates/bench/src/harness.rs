//! Wiring of a run from its configuration

use crate::config::BenchConfig;
use bench_lib::admission::{RobotsSource, SafetyGate};
use bench_lib::detector::DegradationDetector;
use bench_lib::health::HealthRegistry;
use bench_lib::host::HostSampler;
use bench_lib::observability::StructuredLogger;
use bench_lib::pool::ResourcePool;
use bench_lib::ramp::{RampController, RampPlan};
use bench_lib::runner::{PageFetcher, TaskRunner};
use std::sync::Arc;

/// Capabilities a run is built from
pub struct Capabilities {
    pub fetcher: Arc<dyn PageFetcher>,
    pub robots: Option<Arc<dyn RobotsSource>>,
    pub sampler: Arc<dyn HostSampler>,
}

/// Assemble gate, pool, runner and detector into a ready controller
pub fn build_controller(
    config: &BenchConfig,
    plan: RampPlan,
    capabilities: Capabilities,
    health: &HealthRegistry,
    run_id: &str,
) -> RampController {
    let gate = Arc::new(
        SafetyGate::new(config.safety.clone(), capabilities.robots).with_health(health.clone()),
    );
    let pool = Arc::new(ResourcePool::new(config.pool.clone()));
    let runner = TaskRunner::new(gate, pool, capabilities.fetcher, config.workload.mode);

    RampController::new(
        plan,
        config.ramp_config(),
        runner,
        capabilities.sampler,
        DegradationDetector::new(config.thresholds.clone()),
    )
    .with_health(health.clone())
    .with_logger(StructuredLogger::new(run_id))
}

/// Identifier attached to every log event of a run
pub fn run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

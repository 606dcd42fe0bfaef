//! Core library for the maximum sustainable concurrency harness
//!
//! This crate provides:
//! - Admission control (rate limiting, concurrency and total caps, robots.txt)
//! - A bounded pool of reusable execution contexts
//! - The per-level task runner and its page-fetch capability
//! - Sample aggregation, latency percentiles and degradation detection
//! - The ramp controller that ties the loop together
//! - Host sampling, health checks and observability

pub mod admission;
pub mod detector;
pub mod error;
pub mod health;
pub mod host;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod pool;
pub mod ramp;
pub mod runner;
pub mod workload;

pub use error::{AdmissionDenied, BenchError, FetchError, PoolError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{BenchMetrics, StructuredLogger};

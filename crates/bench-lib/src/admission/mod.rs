//! Admission control
//!
//! This module provides:
//! - Per-domain sliding-window rate limiting
//! - robots.txt policy with a per-origin cache
//! - The safety gate combining both with concurrency and total caps

mod rate_limiter;
mod robots;
mod safety_gate;

pub use rate_limiter::RateLimiter;
pub use robots::{RobotsPolicy, RobotsRules, RobotsSource};
pub use safety_gate::{AdmissionPermit, AdmissionState, SafetyConfig, SafetyGate};

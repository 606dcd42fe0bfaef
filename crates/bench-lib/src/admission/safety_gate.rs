//! Admission control for task execution
//!
//! The safety gate combines four independent checks into one decision:
//! per-domain rate limit, concurrent cap, total cap and robots.txt policy.
//! Tasks that pass hold an [`AdmissionPermit`] that releases their
//! concurrency slot when dropped.

use super::rate_limiter::RateLimiter;
use super::robots::{RobotsPolicy, RobotsSource};
use crate::error::AdmissionDenied;
use crate::health::HealthRegistry;
use crate::observability::BenchMetrics;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Safety limits applied to every task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Requests per second allowed per domain
    #[serde(default = "default_rps")]
    pub rps: u32,
    /// Maximum tasks in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u64,
    /// Maximum tasks issued over the whole run
    #[serde(default = "default_max_total")]
    pub max_total: u64,
    /// Timeout for single requests and robots.txt fetches
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Whether robots.txt rules are enforced
    #[serde(default = "default_robots_respect")]
    pub robots_respect: bool,
}

fn default_rps() -> u32 {
    50
}

fn default_max_concurrent() -> u64 {
    200
}

fn default_max_total() -> u64 {
    100_000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_robots_respect() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            rps: default_rps(),
            max_concurrent: default_max_concurrent(),
            max_total: default_max_total(),
            timeout_seconds: default_timeout_seconds(),
            robots_respect: default_robots_respect(),
        }
    }
}

impl SafetyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Counters shared by every worker of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionState {
    pub current_concurrent: u64,
    pub total_issued: u64,
}

/// Admission decision point for all tasks of a run
pub struct SafetyGate {
    config: SafetyConfig,
    rate_limiter: RateLimiter,
    robots: Option<RobotsPolicy>,
    state: Mutex<AdmissionState>,
    metrics: BenchMetrics,
}

impl SafetyGate {
    /// Create a gate; robots.txt is only consulted when `robots_respect` is set
    /// and a source is supplied
    pub fn new(config: SafetyConfig, robots_source: Option<Arc<dyn RobotsSource>>) -> Self {
        let robots = robots_source
            .filter(|_| config.robots_respect)
            .map(|source| RobotsPolicy::new(source, config.timeout()));

        Self {
            rate_limiter: RateLimiter::new(config.rps),
            robots,
            config,
            state: Mutex::new(AdmissionState::default()),
            metrics: BenchMetrics::new(),
        }
    }

    /// Replace the rate limiter (used to shorten the window in tests)
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Forward robots.txt failures to the health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.robots = self.robots.map(|policy| policy.with_health(health));
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run every admission check for `url` without taking a slot
    pub async fn check(&self, url: &str) -> Result<(), AdmissionDenied> {
        let parsed = Url::parse(url).map_err(|_| AdmissionDenied::InvalidUrl {
            url: url.to_string(),
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| AdmissionDenied::InvalidUrl {
                url: url.to_string(),
            })?
            .to_string();

        if !self.rate_limiter.allow(&domain) {
            return Err(AdmissionDenied::RateLimited { domain });
        }

        {
            let state = self.lock_state();
            if state.current_concurrent >= self.config.max_concurrent {
                return Err(AdmissionDenied::ConcurrencyLimit {
                    limit: self.config.max_concurrent,
                });
            }
            if state.total_issued >= self.config.max_total {
                return Err(AdmissionDenied::TotalLimit {
                    limit: self.config.max_total,
                });
            }
        }

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&parsed).await {
                return Err(AdmissionDenied::RobotsDisallowed {
                    path: parsed.path().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Whether a task for `url` may run now
    pub async fn can_proceed(&self, url: &str) -> bool {
        self.check(url).await.is_ok()
    }

    /// Take a concurrency slot and count one issued task
    pub fn begin(&self) {
        let mut state = self.lock_state();
        state.current_concurrent += 1;
        state.total_issued += 1;
    }

    /// Give back a concurrency slot
    pub fn end(&self) {
        let mut state = self.lock_state();
        state.current_concurrent = state.current_concurrent.saturating_sub(1);
    }

    /// Take a slot only if the caps still hold; checked and updated under one lock
    fn try_begin(&self) -> Result<(), AdmissionDenied> {
        let mut state = self.lock_state();
        if state.current_concurrent >= self.config.max_concurrent {
            return Err(AdmissionDenied::ConcurrencyLimit {
                limit: self.config.max_concurrent,
            });
        }
        if state.total_issued >= self.config.max_total {
            return Err(AdmissionDenied::TotalLimit {
                limit: self.config.max_total,
            });
        }
        state.current_concurrent += 1;
        state.total_issued += 1;
        Ok(())
    }

    /// Check `url` and, when admitted, take a slot held by the returned permit
    pub async fn admit(self: &Arc<Self>, url: &str) -> Result<AdmissionPermit, AdmissionDenied> {
        let decision = match self.check(url).await {
            Ok(()) => self.try_begin(),
            Err(denied) => Err(denied),
        };

        match decision {
            Ok(()) => Ok(AdmissionPermit {
                gate: Arc::clone(self),
            }),
            Err(denied) => {
                debug!(url = %url, reason = %denied, "Task denied by safety gate");
                self.metrics.inc_admission_denied(denied.label());
                Err(denied)
            }
        }
    }

    /// Current counter values
    pub fn state(&self) -> AdmissionState {
        *self.lock_state()
    }

    /// Clear counters, rate-limit history and robots cache between runs
    pub fn reset(&self) {
        *self.lock_state() = AdmissionState::default();
        self.rate_limiter.reset();
        if let Some(robots) = &self.robots {
            robots.clear();
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }
}

/// Concurrency slot held by an admitted task; released on drop
pub struct AdmissionPermit {
    gate: Arc<SafetyGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.end();
    }
}

//! Error types shared across the harness

use thiserror::Error;

/// Fatal errors raised before a run starts
#[derive(Debug, Error)]
pub enum BenchError {
    /// Ramp plan is empty or contains a zero level
    #[error("invalid ramp plan: {0}")]
    InvalidPlan(String),

    /// Any other configuration value that cannot be used
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason a task was refused by the safety gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionDenied {
    #[error("rate limit exceeded for domain {domain}")]
    RateLimited { domain: String },

    #[error("concurrency limit of {limit} reached")]
    ConcurrencyLimit { limit: u64 },

    #[error("total request limit of {limit} reached")]
    TotalLimit { limit: u64 },

    #[error("path {path} disallowed by robots.txt")]
    RobotsDisallowed { path: String },

    #[error("cannot determine domain of {url}")]
    InvalidUrl { url: String },
}

impl AdmissionDenied {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            AdmissionDenied::RateLimited { .. } => "rate",
            AdmissionDenied::ConcurrencyLimit { .. } => "concurrency",
            AdmissionDenied::TotalLimit { .. } => "total",
            AdmissionDenied::RobotsDisallowed { .. } => "robots",
            AdmissionDenied::InvalidUrl { .. } => "invalid_url",
        }
    }
}

/// Failure of the injected fetch capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Raised by the execution engine behind the fetcher (e.g. a browser)
    #[error("engine error: {0}")]
    Engine(String),
}

/// Resource pool failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("resource pool exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },
}

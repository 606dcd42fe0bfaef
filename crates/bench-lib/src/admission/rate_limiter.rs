//! Per-domain sliding-window rate limiting
//!
//! Keeps the timestamps of admitted requests per domain and admits a new one
//! only while fewer than `rps` fall inside the trailing window.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default sliding window length
const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Sliding-window admission per domain
pub struct RateLimiter {
    /// Requests allowed per window
    rps: u32,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `rps` requests per second per domain
    pub fn new(rps: u32) -> Self {
        Self::with_window(rps, DEFAULT_WINDOW)
    }

    /// Create a limiter with a custom window length
    pub fn with_window(rps: u32, window: Duration) -> Self {
        Self {
            rps,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or refuse a request to `domain`, recording it when admitted
    pub fn allow(&self, domain: &str) -> bool {
        self.allow_at(domain, Instant::now())
    }

    fn allow_at(&self, domain: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = requests.entry(domain.to_string()).or_default();

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.rps as usize {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Forget every recorded request
    pub fn reset(&self) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Requests per window this limiter admits
    pub fn rps(&self) -> u32 {
        self.rps
    }
}

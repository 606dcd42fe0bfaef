//! robots.txt policy
//!
//! Fetches `robots.txt` once per origin, caches the parsed `Disallow:`
//! prefixes and answers whether a path may be requested. Any failure to
//! obtain the file (error or timeout) is treated as "everything allowed".

use crate::health::{components, HealthRegistry};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Source of robots.txt contents
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetch the raw robots.txt body for `origin` (`scheme://host[:port]`)
    async fn fetch_robots(&self, origin: &str) -> Result<String>;
}

/// Parsed disallow rules for one origin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    disallowed: Vec<String>,
}

impl RobotsRules {
    /// Parse robots.txt content, keeping every non-empty `Disallow:` prefix
    pub fn parse(content: &str) -> Self {
        let disallowed = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.trim().eq_ignore_ascii_case("disallow") {
                    let value = value.trim();
                    (!value.is_empty()).then(|| value.to_string())
                } else {
                    None
                }
            })
            .collect();

        Self { disallowed }
    }

    /// Rules that allow everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether `path` is outside every disallowed prefix
    pub fn is_allowed(&self, path: &str) -> bool {
        !self.disallowed.iter().any(|prefix| path.starts_with(prefix))
    }

    pub fn disallowed(&self) -> &[String] {
        &self.disallowed
    }
}

/// Cached robots.txt policy keyed by origin
pub struct RobotsPolicy {
    source: Arc<dyn RobotsSource>,
    fetch_timeout: Duration,
    cache: DashMap<String, Arc<OnceCell<Arc<RobotsRules>>>>,
    health: Option<HealthRegistry>,
}

impl RobotsPolicy {
    pub fn new(source: Arc<dyn RobotsSource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
            cache: DashMap::new(),
            health: None,
        }
    }

    /// Report fetch failures as a degraded `robots` component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Check whether `url` may be fetched
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let rules = self.rules_for(&origin).await;
        rules.is_allowed(url.path())
    }

    async fn rules_for(&self, origin: &str) -> Arc<RobotsRules> {
        // Clone the cell out so the shard lock is not held across the fetch
        let cell = self.cache.entry(origin.to_string()).or_default().clone();
        cell.get_or_init(|| async { Arc::new(self.fetch_rules(origin).await) })
            .await
            .clone()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        match timeout(self.fetch_timeout, self.source.fetch_robots(origin)).await {
            Ok(Ok(content)) => {
                let rules = RobotsRules::parse(&content);
                debug!(
                    origin = %origin,
                    disallowed = rules.disallowed.len(),
                    "Loaded robots.txt"
                );
                rules
            }
            Ok(Err(e)) => {
                warn!(origin = %origin, error = %e, "robots.txt unavailable, allowing all paths");
                self.report_degraded(format!("{}: {}", origin, e)).await;
                RobotsRules::allow_all()
            }
            Err(_) => {
                warn!(
                    origin = %origin,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "robots.txt fetch timed out, allowing all paths"
                );
                self.report_degraded(format!("{}: fetch timed out", origin))
                    .await;
                RobotsRules::allow_all()
            }
        }
    }

    async fn report_degraded(&self, message: String) {
        if let Some(health) = &self.health {
            health.set_degraded(components::ROBOTS, message).await;
        }
    }

    /// Drop all cached rules
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of origins with cached rules
    pub fn cached_origins(&self) -> usize {
        self.cache.iter().filter(|cell| cell.initialized()).count()
    }
}

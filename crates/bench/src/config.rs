//! Run configuration
//!
//! Loaded from an optional file (format chosen by extension) with
//! `MSC_`-prefixed environment variables layered on top, e.g.
//! `MSC_SAFETY__RPS=20` or `MSC_WORKLOAD__URLS=https://a,https://b`.

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use bench_lib::admission::SafetyConfig;
use bench_lib::detector::Thresholds;
use bench_lib::pool::PoolConfig;
use bench_lib::ramp::{RampConfig, RampPlan, RampSpec, RampStrategy};
use bench_lib::workload::{WorkloadConfig, WorkloadDocument};
use bench_lib::BenchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "MSC";

/// Full run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub ramp: RampSpec,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Run duration and reporting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_max_runtime_minutes")]
    pub max_runtime_minutes: f64,
    /// Levels shorter than this are padded with cooldown
    #[serde(default = "default_min_level_seconds")]
    pub min_level_seconds: f64,
    #[serde(default = "default_cooldown_floor_seconds")]
    pub cooldown_floor_seconds: f64,
    #[serde(default = "default_cooldown_fraction")]
    pub cooldown_fraction: f64,
    #[serde(default)]
    pub format: OutputFormat,
    /// Where to write the JSON report, if anywhere
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_max_runtime_minutes() -> f64 {
    30.0
}

fn default_min_level_seconds() -> f64 {
    10.0
}

fn default_cooldown_floor_seconds() -> f64 {
    1.0
}

fn default_cooldown_fraction() -> f64 {
    0.1
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_runtime_minutes: default_max_runtime_minutes(),
            min_level_seconds: default_min_level_seconds(),
            cooldown_floor_seconds: default_cooldown_floor_seconds(),
            cooldown_fraction: default_cooldown_fraction(),
            format: OutputFormat::default(),
            report_path: None,
        }
    }
}

/// Status and metrics server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    9464
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_api_port(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("workload.urls")
                    .with_list_parse_key("ramp.levels"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Merge the workload document, if one is configured
    ///
    /// Its URLs replace `workload.urls`. Its concurrency becomes the only
    /// level of a custom ramp that has none.
    pub async fn resolve_workload(&mut self) -> Result<Option<WorkloadDocument>> {
        let Some(path) = self.workload.document_path.clone() else {
            return Ok(None);
        };

        let document = WorkloadDocument::load(&path).await?;
        info!(
            path = %path.display(),
            urls = document.urls.len(),
            concurrency = ?document.concurrency,
            "Loaded workload document"
        );

        self.workload.urls = document.urls.clone();
        if let Some(concurrency) = document.concurrency {
            if self.ramp.strategy == RampStrategy::Custom && self.ramp.levels.is_empty() {
                self.ramp.levels.push(concurrency);
            }
        }

        Ok(Some(document))
    }

    /// Check every section; returns the resolved ramp plan
    pub fn validate(&self) -> Result<RampPlan, BenchError> {
        self.workload.validate()?;
        let plan = self.ramp.build()?;

        let t = &self.thresholds;
        if !(t.latency_multiplier.is_finite() && t.latency_multiplier > 0.0) {
            return Err(invalid("thresholds.latency_multiplier must be positive"));
        }
        for (name, value) in [
            ("thresholds.cpu_utilization", t.cpu_utilization),
            ("thresholds.mem_utilization", t.mem_utilization),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{} must be within 0..=100", name)));
            }
        }
        if !(0.0..=1.0).contains(&t.error_rate) {
            return Err(invalid("thresholds.error_rate must be within 0..=1"));
        }

        if self.safety.rps == 0 {
            return Err(invalid("safety.rps must be positive"));
        }
        if self.safety.max_concurrent == 0 {
            return Err(invalid("safety.max_concurrent must be positive"));
        }
        if self.safety.timeout_seconds == 0 {
            return Err(invalid("safety.timeout_seconds must be positive"));
        }

        if self.pool.capacity == 0 {
            return Err(invalid("pool.capacity must be positive"));
        }

        let o = &self.output;
        for (name, value) in [
            ("output.max_runtime_minutes", o.max_runtime_minutes),
            ("output.min_level_seconds", o.min_level_seconds),
            ("output.cooldown_floor_seconds", o.cooldown_floor_seconds),
            ("output.cooldown_fraction", o.cooldown_fraction),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(format!("{} must be a non-negative number", name)));
            }
        }

        Ok(plan)
    }

    /// Controller settings derived from the workload and output sections
    pub fn ramp_config(&self) -> RampConfig {
        RampConfig {
            urls: self.workload.urls.clone(),
            repetitions: self.workload.repetitions,
            max_runtime: seconds(self.output.max_runtime_minutes * 60.0),
            min_level_duration: seconds(self.output.min_level_seconds),
            cooldown_floor: seconds(self.output.cooldown_floor_seconds),
            cooldown_fraction: self.output.cooldown_fraction,
        }
    }
}

/// Saturating conversion; values are validated non-negative beforehand
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

fn invalid(message: impl Into<String>) -> BenchError {
    BenchError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_lib::runner::WorkloadMode;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const TOML: &str = r#"
[workload]
mode = "browser"
urls = ["https://example.com/", "https://example.com/about"]
repetitions = 2

[ramp]
strategy = "linear"
start = 2
max = 8
step = 2

[thresholds]
latency_multiplier = 3.0

[safety]
rps = 20
robots_respect = false

[output]
max_runtime_minutes = 5
format = "json"

[pool]
capacity = 4
exhaustion = "fail"
"#;

    fn toml_file() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TOML.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = toml_file();
        let config = BenchConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.workload.mode, WorkloadMode::Browser);
        assert_eq!(config.workload.urls.len(), 2);
        assert_eq!(config.workload.repetitions, 2);
        assert_eq!(config.thresholds.latency_multiplier, 3.0);
        // untouched fields keep their defaults
        assert_eq!(config.thresholds.error_rate, 0.05);
        assert_eq!(config.safety.rps, 20);
        assert!(!config.safety.robots_respect);
        assert_eq!(config.pool.capacity, 4);
        assert_eq!(config.output.format, OutputFormat::Json);

        let plan = config.validate().unwrap();
        assert_eq!(plan.levels(), &[2, 4, 6, 8]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(BenchConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_defaults_validate() {
        let config = BenchConfig::default();
        let plan = tokio_test::assert_ok!(config.validate());
        assert_eq!(plan.levels(), &[1, 2, 4, 8, 16, 32, 64]);
        assert!(!config.api.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BenchConfig::default();
        config.thresholds.cpu_utilization = 150.0;
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));

        let mut config = BenchConfig::default();
        config.ramp.levels = vec![1, 0];
        assert!(matches!(config.validate(), Err(BenchError::InvalidPlan(_))));

        let mut config = BenchConfig::default();
        config.safety.rps = 0;
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.output.cooldown_fraction = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ramp_config_conversion() {
        let mut config = BenchConfig::default();
        config.workload.urls = vec!["https://example.com/".to_string()];
        config.output.max_runtime_minutes = 0.5;
        config.output.min_level_seconds = 2.5;

        let ramp = config.ramp_config();
        assert_eq!(ramp.urls.len(), 1);
        assert_eq!(ramp.max_runtime, Duration::from_secs(30));
        assert_eq!(ramp.min_level_duration, Duration::from_millis(2500));
        assert_eq!(ramp.cooldown_floor, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_workload_document_fills_custom_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workload.json");
        tokio::fs::write(
            &path,
            r#"{"urls":["https://docs.example/"],"concurrency":6,"parameters":{}}"#,
        )
        .await
        .unwrap();

        let mut config = BenchConfig::default();
        config.workload.urls = vec!["https://replaced.example/".to_string()];
        config.workload.document_path = Some(path);
        config.ramp.strategy = RampStrategy::Custom;

        let document = config.resolve_workload().await.unwrap();
        assert!(document.is_some());
        assert_eq!(config.workload.urls, vec!["https://docs.example/".to_string()]);
        assert_eq!(config.validate().unwrap().levels(), &[6]);
    }

    #[tokio::test]
    async fn test_workload_document_keeps_generated_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workload.json");
        tokio::fs::write(&path, r#"{"urls":["https://docs.example/"],"concurrency":6}"#)
            .await
            .unwrap();

        let mut config = BenchConfig::default();
        config.workload.document_path = Some(path);

        config.resolve_workload().await.unwrap();
        assert!(config.ramp.levels.is_empty());
        assert_eq!(config.validate().unwrap().first_level(), 1);
    }

    #[tokio::test]
    async fn test_invalid_workload_document_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workload.json");
        tokio::fs::write(&path, r#"{"urls":[]}"#).await.unwrap();

        let mut config = BenchConfig::default();
        config.workload.document_path = Some(path);
        assert!(config.resolve_workload().await.is_err());
    }
}

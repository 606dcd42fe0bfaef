//! Host metrics from the Linux proc filesystem
//!
//! Reads:
//! - /proc/stat for CPU time (usage is the delta between two samples)
//! - /proc/meminfo for total and available memory
//! - /proc/loadavg for the 1/5/15 minute load averages

use super::HostSampler;
use crate::models::HostSnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;

/// Cumulative CPU counters from the aggregate `cpu` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage between `previous` and `self`
    fn usage_since(&self, previous: Option<CpuTimes>) -> f64 {
        let (total, idle) = match previous {
            Some(prev) if self.total > prev.total => {
                (self.total - prev.total, self.idle.saturating_sub(prev.idle))
            }
            _ => (self.total, self.idle),
        };

        if total == 0 {
            return 0.0;
        }
        (total.saturating_sub(idle) as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Host sampler backed by /proc
pub struct ProcHostSampler {
    proc_path: PathBuf,
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl ProcHostSampler {
    pub fn new() -> Self {
        Self::with_proc_path("/proc")
    }

    /// Create sampler with custom proc path (for testing)
    pub fn with_proc_path(proc_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_path: proc_path.into(),
            last_cpu: Mutex::new(None),
        }
    }

    /// Parse the aggregate `cpu` line of /proc/stat
    pub fn parse_cpu_stat(content: &str) -> Result<CpuTimes> {
        let line = content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .context("No aggregate cpu line in /proc/stat")?;

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse().unwrap_or(0))
            .collect();

        if fields.len() < 4 {
            anyhow::bail!("Truncated cpu line in /proc/stat: {}", line);
        }

        // user nice system idle iowait irq softirq steal; guest time is already in user
        let total: u64 = fields.iter().take(8).sum();
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);

        Ok(CpuTimes { total, idle })
    }

    /// Parse /proc/meminfo into a map of field name to kB
    pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
        let mut values = HashMap::new();

        for line in content.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            if let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) {
                values.insert(key.trim().to_string(), value);
            }
        }

        values
    }

    /// Used memory percentage from parsed meminfo
    pub fn memory_usage_percent(meminfo: &HashMap<String, u64>) -> Result<f64> {
        let total = *meminfo.get("MemTotal").context("MemTotal missing")?;
        if total == 0 {
            anyhow::bail!("MemTotal is zero");
        }

        let available = meminfo.get("MemAvailable").copied().unwrap_or_else(|| {
            ["MemFree", "Buffers", "Cached"]
                .iter()
                .filter_map(|key| meminfo.get(*key))
                .sum()
        });

        Ok(total.saturating_sub(available) as f64 / total as f64 * 100.0)
    }

    /// Parse the first three fields of /proc/loadavg
    pub fn parse_loadavg(content: &str) -> Result<[f64; 3]> {
        let values: Vec<f64> = content
            .split_whitespace()
            .take(3)
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .context("Invalid /proc/loadavg")?;

        match values.as_slice() {
            [one, five, fifteen] => Ok([*one, *five, *fifteen]),
            _ => anyhow::bail!("Truncated /proc/loadavg"),
        }
    }

    async fn read(&self, name: &str) -> Result<String> {
        let path = self.proc_path.join(name);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

impl Default for ProcHostSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostSampler for ProcHostSampler {
    async fn prime(&self) -> Result<()> {
        let cpu = Self::parse_cpu_stat(&self.read("stat").await?)?;
        *self.last_cpu.lock().unwrap_or_else(|e| e.into_inner()) = Some(cpu);
        Ok(())
    }

    async fn sample(&self) -> Result<HostSnapshot> {
        let cpu = Self::parse_cpu_stat(&self.read("stat").await?)?;
        let meminfo = Self::parse_meminfo(&self.read("meminfo").await?);
        let load_average = Self::parse_loadavg(&self.read("loadavg").await?)?;

        let cpu_usage = {
            let mut last = self.last_cpu.lock().unwrap_or_else(|e| e.into_inner());
            let usage = cpu.usage_since(*last);
            *last = Some(cpu);
            usage
        };

        Ok(HostSnapshot {
            cpu_usage,
            memory_usage: Self::memory_usage_percent(&meminfo)?,
            load_average,
        })
    }
}

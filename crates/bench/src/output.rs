//! Terminal and JSON rendering of run results

use anyhow::{Context, Result};
use bench_lib::ramp::{RampPlan, RunReport, StopReason};
use bench_lib::Sample;
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    Json,
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Level")]
    level: u32,
    #[tabled(rename = "Tasks")]
    attempted: usize,
    #[tabled(rename = "Errors")]
    error_rate: String,
    #[tabled(rename = "p50")]
    p50: String,
    #[tabled(rename = "p95")]
    p95: String,
    #[tabled(rename = "p99")]
    p99: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Mem")]
    memory: String,
}

impl SampleRow {
    fn new(index: usize, sample: &Sample) -> Self {
        Self {
            index,
            level: sample.level,
            attempted: sample.tasks.attempted,
            error_rate: format_percent(sample.tasks.error_rate * 100.0),
            p50: format_ms(sample.latency_ms.p50),
            p95: format_ms(sample.latency_ms.p95),
            p99: format_ms(sample.latency_ms.p99),
            cpu: format_percent(sample.host.cpu_usage),
            memory: format_percent(sample.host.memory_usage),
        }
    }
}

/// Format milliseconds, switching to seconds past 1000ms
pub fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.1}ms", ms)
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Color a stop reason for the terminal
pub fn color_stop_reason(reason: StopReason) -> String {
    match reason {
        StopReason::Completed => "completed".green().to_string(),
        StopReason::Degradation => "degradation".yellow().to_string(),
        StopReason::TimeLimit => "time limit".yellow().to_string(),
        StopReason::Interrupted => "interrupted".red().to_string(),
    }
}

/// Render the per-sample table of a report
pub fn samples_table(samples: &[Sample]) -> String {
    let rows: Vec<SampleRow> = samples
        .iter()
        .enumerate()
        .map(|(index, sample)| SampleRow::new(index, sample))
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the run summary in the requested format
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if report.samples.is_empty() {
                print_warning("No samples recorded");
            } else {
                println!("{}", samples_table(&report.samples));
            }

            if let Some(baseline) = &report.baseline {
                print_info(&format!(
                    "Baseline p50 {} / p95 {} / p99 {}",
                    format_ms(baseline.p50),
                    format_ms(baseline.p95),
                    format_ms(baseline.p99)
                ));
            }
            if report.verdict.detected {
                print_warning(&format!(
                    "Degradation at level {}: {}",
                    report
                        .verdict
                        .triggering_level
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    report.verdict.reason
                ));
            }
            println!(
                "Stopped: {} after {:.1}s",
                color_stop_reason(report.stop_reason),
                report.elapsed_secs
            );
            print_success(&format!(
                "Maximum sustainable concurrency: {}",
                report.msc.to_string().bold()
            ));
        }
    }
    Ok(())
}

/// Print a resolved plan
pub fn print_plan(plan: &RampPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            let levels: Vec<String> = plan.levels().iter().map(u32::to_string).collect();
            print_info(&format!("Strategy: {}", plan.strategy()));
            println!("Levels: {}", levels.join(" → "));
        }
    }
    Ok(())
}

/// Write the JSON report to `path`
pub async fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_lib::{HostSnapshot, LatencyPercentiles, TaskCounts};
    use chrono::Utc;

    fn sample(level: u32, p95: f64) -> Sample {
        Sample {
            level,
            timestamp: Utc::now(),
            tasks: TaskCounts {
                attempted: level as usize,
                successful: level as usize,
                failed: 0,
                error_rate: 0.0,
            },
            latency_ms: LatencyPercentiles {
                p50: p95 / 2.0,
                p90: p95,
                p95,
                p99: p95,
            },
            host: HostSnapshot::default(),
        }
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(12.345), "12.3ms");
        assert_eq!(format_ms(1500.0), "1.50s");
    }

    #[test]
    fn test_samples_table_has_row_per_sample() {
        let table = samples_table(&[sample(1, 100.0), sample(2, 180.0)]);
        assert!(table.contains("Level"));
        assert!(table.contains("180.0ms"));
        assert_eq!(table.matches("0.0%").count(), 6);
    }

    #[tokio::test]
    async fn test_write_report_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = RunReport {
            started_at: Utc::now(),
            elapsed_secs: 1.0,
            planned_levels: vec![1, 2],
            levels_executed: vec![1, 2],
            samples: vec![sample(1, 100.0), sample(2, 150.0)],
            baseline: None,
            verdict: Default::default(),
            msc: 2,
            stop_reason: StopReason::Completed,
        };

        write_report(&report, &path).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(value["msc"], 2);
        assert_eq!(value["stop_reason"], "completed");
        assert_eq!(value["samples"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_output_format_deserializes() {
        let format: OutputFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, OutputFormat::Json);
    }
}

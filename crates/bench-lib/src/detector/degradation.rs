//! Degradation detection
//!
//! Compares each new sample against the run baseline and absolute host/error
//! thresholds. The first check that fires freezes the verdict for the rest of
//! the run.

use crate::models::{Baseline, DegradationVerdict, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Degradation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Allowed p95 growth over the baseline p95
    #[serde(default = "default_latency_multiplier")]
    pub latency_multiplier: f64,
    /// Host CPU usage percentage
    #[serde(default = "default_cpu_utilization")]
    pub cpu_utilization: f64,
    /// Host memory usage percentage
    #[serde(default = "default_mem_utilization")]
    pub mem_utilization: f64,
    /// Fraction of failed tasks in a batch
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

fn default_latency_multiplier() -> f64 {
    2.0
}

fn default_cpu_utilization() -> f64 {
    90.0
}

fn default_mem_utilization() -> f64 {
    90.0
}

fn default_error_rate() -> f64 {
    0.05
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_multiplier: default_latency_multiplier(),
            cpu_utilization: default_cpu_utilization(),
            mem_utilization: default_mem_utilization(),
            error_rate: default_error_rate(),
        }
    }
}

/// Which check fired
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegradationCause {
    Latency {
        p95_ms: f64,
        limit_ms: f64,
        multiplier: f64,
    },
    Cpu {
        usage: f64,
        threshold: f64,
    },
    Memory {
        usage: f64,
        threshold: f64,
    },
    ErrorRate {
        rate: f64,
        threshold: f64,
    },
}

impl DegradationCause {
    pub fn kind(&self) -> &'static str {
        match self {
            DegradationCause::Latency { .. } => "latency",
            DegradationCause::Cpu { .. } => "cpu",
            DegradationCause::Memory { .. } => "memory",
            DegradationCause::ErrorRate { .. } => "error_rate",
        }
    }
}

impl fmt::Display for DegradationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradationCause::Latency {
                p95_ms,
                limit_ms,
                multiplier,
            } => write!(
                f,
                "p95 latency {:.1}ms exceeded {:.1}ms ({}x baseline p95)",
                p95_ms, limit_ms, multiplier
            ),
            DegradationCause::Cpu { usage, threshold } => {
                write!(f, "CPU usage {:.1}% exceeded {:.1}%", usage, threshold)
            }
            DegradationCause::Memory { usage, threshold } => {
                write!(f, "memory usage {:.1}% exceeded {:.1}%", usage, threshold)
            }
            DegradationCause::ErrorRate { rate, threshold } => write!(
                f,
                "error rate {:.1}% exceeded {:.1}%",
                rate * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Sticky degradation detector
#[derive(Debug)]
pub struct DegradationDetector {
    thresholds: Thresholds,
    verdict: DegradationVerdict,
    cause: Option<DegradationCause>,
    checked: usize,
}

impl DegradationDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            verdict: DegradationVerdict::default(),
            cause: None,
            checked: 0,
        }
    }

    /// Evaluate one sample without touching detector state
    pub fn evaluate(
        &self,
        sample: &Sample,
        baseline: Option<&Baseline>,
    ) -> Option<DegradationCause> {
        if let Some(baseline) = baseline.filter(|b| b.p95 > 0.0) {
            let limit_ms = baseline.p95 * self.thresholds.latency_multiplier;
            if sample.latency_ms.p95 > limit_ms {
                return Some(DegradationCause::Latency {
                    p95_ms: sample.latency_ms.p95,
                    limit_ms,
                    multiplier: self.thresholds.latency_multiplier,
                });
            }
        }

        if sample.host.cpu_usage > self.thresholds.cpu_utilization {
            return Some(DegradationCause::Cpu {
                usage: sample.host.cpu_usage,
                threshold: self.thresholds.cpu_utilization,
            });
        }

        if sample.host.memory_usage > self.thresholds.mem_utilization {
            return Some(DegradationCause::Memory {
                usage: sample.host.memory_usage,
                threshold: self.thresholds.mem_utilization,
            });
        }

        if sample.tasks.error_rate > self.thresholds.error_rate {
            return Some(DegradationCause::ErrorRate {
                rate: sample.tasks.error_rate,
                threshold: self.thresholds.error_rate,
            });
        }

        None
    }

    /// Check the next sample of the run
    ///
    /// Samples must be passed in log order. Returns true only on the call that
    /// first detects degradation; once detected, later calls are no-ops.
    pub fn check(&mut self, sample: &Sample, baseline: Option<&Baseline>) -> bool {
        let index = self.checked;
        self.checked += 1;

        if self.verdict.detected {
            return false;
        }

        match self.evaluate(sample, baseline) {
            Some(cause) => {
                self.verdict = DegradationVerdict {
                    detected: true,
                    reason: cause.to_string(),
                    triggering_level: Some(sample.level),
                    sample_index: Some(index),
                };
                self.cause = Some(cause);
                true
            }
            None => false,
        }
    }

    pub fn verdict(&self) -> &DegradationVerdict {
        &self.verdict
    }

    pub fn is_detected(&self) -> bool {
        self.verdict.detected
    }

    /// Cause of the frozen verdict, if any
    pub fn cause(&self) -> Option<DegradationCause> {
        self.cause
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Maximum sustainable concurrency for the given sample log
    pub fn compute_msc(&self, samples: &[Sample]) -> u32 {
        compute_msc(samples, &self.verdict)
    }
}

/// Maximum sustainable concurrency
///
/// Without degradation this is the highest level executed. With degradation
/// it is the last level run before the triggering level; when nothing ran
/// before it, 1.
pub fn compute_msc(samples: &[Sample], verdict: &DegradationVerdict) -> u32 {
    if !verdict.detected {
        return samples.iter().map(|s| s.level).max().unwrap_or(0);
    }

    let index = verdict
        .sample_index
        .unwrap_or(samples.len())
        .min(samples.len());
    let triggering_level = verdict.triggering_level.or_else(|| samples.get(index).map(|s| s.level));

    samples[..index]
        .iter()
        .rev()
        .find(|s| Some(s.level) != triggering_level)
        .map(|s| s.level)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostSnapshot, LatencyPercentiles, TaskCounts};
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

    fn baseline(p95: f64) -> Baseline {
        Baseline {
            p50: p95 / 2.0,
            p95,
            p99: p95,
        }
    }

    #[test]
    fn test_latency_degradation_scenario() {
        let mut detector = DegradationDetector::new(Thresholds {
            latency_multiplier: 2.0,
            ..Default::default()
        });
        let base = baseline(200.0);
        let samples = vec![sample(1, 200.0), sample(2, 300.0), sample(4, 500.0)];

        assert!(!detector.check(&samples[0], Some(&base)));
        assert!(!detector.check(&samples[1], Some(&base)));
        assert!(detector.check(&samples[2], Some(&base)));

        let verdict = detector.verdict();
        assert!(verdict.detected);
        assert!(verdict.reason.contains("p95"));
        assert_eq!(verdict.triggering_level, Some(4));
        assert_eq!(detector.compute_msc(&samples), 2);
        assert_eq!(detector.cause().map(|c| c.kind()), Some("latency"));
    }

    #[test]
    fn test_verdict_is_sticky() {
        let mut detector = DegradationDetector::new(Thresholds::default());
        let base = baseline(100.0);

        let mut hot = sample(2, 100.0);
        hot.host.cpu_usage = 99.0;
        assert!(detector.check(&hot, Some(&base)));
        let frozen = detector.verdict().clone();

        let healthy = sample(4, 50.0);
        assert!(!detector.check(&healthy, Some(&base)));

        let mut failing = sample(8, 100.0);
        failing.tasks.error_rate = 1.0;
        assert!(!detector.check(&failing, Some(&base)));

        assert_eq!(detector.verdict(), &frozen);
        assert!(detector.verdict().reason.contains("CPU"));
    }

    #[test]
    fn test_check_order_latency_first() {
        let detector = DegradationDetector::new(Thresholds::default());
        let mut s = sample(4, 1000.0);
        s.host.cpu_usage = 99.0;
        s.host.memory_usage = 99.0;
        s.tasks.error_rate = 1.0;

        let cause = detector.evaluate(&s, Some(&baseline(100.0)));
        assert_eq!(cause.map(|c| c.kind()), Some("latency"));

        let cause = detector.evaluate(&s, None);
        assert_eq!(cause.map(|c| c.kind()), Some("cpu"));

        s.host.cpu_usage = 10.0;
        assert_eq!(detector.evaluate(&s, None).map(|c| c.kind()), Some("memory"));

        s.host.memory_usage = 10.0;
        assert_eq!(detector.evaluate(&s, None).map(|c| c.kind()), Some("error_rate"));
    }

    #[test]
    fn test_thresholds_are_strict() {
        let detector = DegradationDetector::new(Thresholds::default());
        let mut s = sample(2, 200.0);
        s.host.cpu_usage = 90.0;
        s.host.memory_usage = 90.0;
        s.tasks.error_rate = 0.05;

        assert!(detector.evaluate(&s, Some(&baseline(100.0))).is_none());
    }

    #[test]
    fn test_zero_baseline_skips_latency_check() {
        let detector = DegradationDetector::new(Thresholds::default());
        let s = sample(2, 500.0);
        assert!(detector.evaluate(&s, Some(&baseline(0.0))).is_none());
    }

    #[test]
    fn test_msc_without_degradation_is_max_level() {
        let detector = DegradationDetector::new(Thresholds::default());
        let samples = vec![sample(1, 10.0), sample(8, 10.0), sample(4, 10.0)];
        assert_eq!(detector.compute_msc(&samples), 8);
        assert_eq!(detector.compute_msc(&[]), 0);
    }

    #[test]
    fn test_msc_when_first_sample_degrades() {
        let mut detector = DegradationDetector::new(Thresholds::default());
        let mut s = sample(5, 10.0);
        s.tasks.error_rate = 0.5;

        assert!(detector.check(&s, None));
        assert_eq!(detector.compute_msc(&[s]), 1);
    }

    #[test]
    fn test_msc_skips_repetitions_of_triggering_level() {
        let mut detector = DegradationDetector::new(Thresholds::default());
        let base = baseline(100.0);
        let samples = vec![
            sample(1, 100.0),
            sample(1, 100.0),
            sample(2, 120.0),
            sample(2, 400.0),
        ];

        for s in &samples {
            detector.check(s, Some(&base));
        }

        assert_eq!(detector.verdict().sample_index, Some(3));
        assert_eq!(detector.compute_msc(&samples), 1);
    }

    #[test]
    fn test_reason_names_threshold() {
        let mut detector = DegradationDetector::new(Thresholds {
            error_rate: 0.1,
            ..Default::default()
        });
        let mut s = sample(3, 10.0);
        s.tasks.error_rate = 0.25;

        assert!(detector.check(&s, None));
        assert_eq!(detector.verdict().reason, "error rate 25.0% exceeded 10.0%");
    }
}

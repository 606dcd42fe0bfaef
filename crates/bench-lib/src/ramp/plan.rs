//! Ramp plans
//!
//! A plan is the ordered list of concurrency levels a run visits. It is
//! either given explicitly or generated from a start/max range.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How levels grow between steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampStrategy {
    #[default]
    Exponential,
    Linear,
    Custom,
}

impl fmt::Display for RampStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RampStrategy::Exponential => "exponential",
            RampStrategy::Linear => "linear",
            RampStrategy::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Ramp section of the run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampSpec {
    #[serde(default)]
    pub strategy: RampStrategy,
    /// Explicit levels; when set they are used as-is
    #[serde(default)]
    pub levels: Vec<u32>,
    /// First generated level
    #[serde(default = "default_start")]
    pub start: u32,
    /// Generated levels never exceed this
    #[serde(default = "default_max")]
    pub max: u32,
    /// Increment for linear ramps
    #[serde(default = "default_step")]
    pub step: u32,
    /// Multiplier for exponential ramps
    #[serde(default = "default_factor")]
    pub factor: u32,
}

fn default_start() -> u32 {
    1
}

fn default_max() -> u32 {
    64
}

fn default_step() -> u32 {
    5
}

fn default_factor() -> u32 {
    2
}

impl Default for RampSpec {
    fn default() -> Self {
        Self {
            strategy: RampStrategy::default(),
            levels: Vec::new(),
            start: default_start(),
            max: default_max(),
            step: default_step(),
            factor: default_factor(),
        }
    }
}

impl RampSpec {
    /// Resolve the ramp settings into a validated plan
    pub fn build(&self) -> Result<RampPlan, BenchError> {
        if !self.levels.is_empty() {
            return RampPlan::new(self.strategy, self.levels.clone());
        }

        if self.start == 0 {
            return Err(BenchError::InvalidPlan("start level must be positive".to_string()));
        }

        let levels = match self.strategy {
            RampStrategy::Exponential => {
                if self.factor < 2 {
                    return Err(BenchError::InvalidPlan(format!(
                        "exponential factor must be at least 2, got {}",
                        self.factor
                    )));
                }
                let mut levels = Vec::new();
                let mut level = self.start;
                while level <= self.max {
                    levels.push(level);
                    level = match level.checked_mul(self.factor) {
                        Some(next) => next,
                        None => break,
                    };
                }
                levels
            }
            RampStrategy::Linear => {
                if self.step == 0 {
                    return Err(BenchError::InvalidPlan("linear step must be positive".to_string()));
                }
                (self.start..=self.max).step_by(self.step as usize).collect()
            }
            RampStrategy::Custom => {
                return Err(BenchError::InvalidPlan(
                    "custom ramp requires explicit levels".to_string(),
                ))
            }
        };

        RampPlan::new(self.strategy, levels)
    }
}

/// Validated, immutable sequence of concurrency levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RampPlan {
    strategy: RampStrategy,
    levels: Vec<u32>,
}

impl RampPlan {
    /// Build a plan; rejects an empty list or any zero level
    pub fn new(strategy: RampStrategy, levels: Vec<u32>) -> Result<Self, BenchError> {
        if levels.is_empty() {
            return Err(BenchError::InvalidPlan("ramp has no levels".to_string()));
        }
        if let Some(position) = levels.iter().position(|level| *level == 0) {
            return Err(BenchError::InvalidPlan(format!(
                "level at position {} must be positive",
                position
            )));
        }

        Ok(Self { strategy, levels })
    }

    pub fn strategy(&self) -> RampStrategy {
        self.strategy
    }

    /// Levels in visiting order
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn first_level(&self) -> u32 {
        self.levels[0]
    }

    pub fn max_level(&self) -> u32 {
        self.levels.iter().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

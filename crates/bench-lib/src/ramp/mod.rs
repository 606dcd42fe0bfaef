//! Concurrency ramp: plan generation and the controller that executes it

mod controller;
mod plan;

pub use controller::{
    adaptive_wait, RampConfig, RampController, RampState, RunProgress, RunReport, StopReason,
};
pub use plan::{RampPlan, RampSpec, RampStrategy};

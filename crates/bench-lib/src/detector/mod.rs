//! Degradation detection
//!
//! Decides when a ramp has pushed the target past what it can sustain and
//! computes the maximum sustainable concurrency from the sample log.

mod degradation;

pub use degradation::{compute_msc, DegradationCause, DegradationDetector, Thresholds};

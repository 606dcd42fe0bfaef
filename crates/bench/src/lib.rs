//! Command-line harness around `bench-lib`
//!
//! Configuration loading, run wiring, the status server and result output.

pub mod api;
pub mod config;
pub mod harness;
pub mod output;

//! Sample aggregation and latency percentiles

mod aggregator;
mod percentile;

pub use aggregator::MetricsAggregator;
pub use percentile::{latency_percentiles, percentile, valid_sorted};

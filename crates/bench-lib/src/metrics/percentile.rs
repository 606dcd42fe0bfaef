//! Latency percentiles
//!
//! Nearest-rank percentile with `index = floor(n * p)` clamped to the last
//! element, except the median of an even-length list, which is the mean of
//! the two middle values.

use crate::models::LatencyPercentiles;

/// Percentile of an ascending-sorted slice; 0.0 when empty
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }

    if p == 0.5 && n % 2 == 0 {
        return (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0;
    }

    let index = ((n as f64) * p).floor().max(0.0) as usize;
    sorted[index.min(n - 1)]
}

/// Keep positive, finite durations and sort them ascending
pub fn valid_sorted(durations: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = durations
        .into_iter()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// p50/p90/p95/p99 of the given durations
pub fn latency_percentiles(durations: impl IntoIterator<Item = f64>) -> LatencyPercentiles {
    let sorted = valid_sorted(durations);
    LatencyPercentiles {
        p50: percentile(&sorted, 0.5),
        p90: percentile(&sorted, 0.9),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_length() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 0.5), 2.0);
    }

    #[test]
    fn test_median_even_length_averages_middle() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_eq!(percentile(&[10.0, 30.0], 0.5), 20.0);
    }

    #[test]
    fn test_median_matches_conventional_definition() {
        for n in 1..40usize {
            let values: Vec<f64> = (1..=n).map(|v| (v * v) as f64).collect();
            let expected = if n % 2 == 1 {
                values[n / 2]
            } else {
                (values[n / 2 - 1] + values[n / 2]) / 2.0
            };
            assert_eq!(percentile(&values, 0.5), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_high_percentiles_use_floor_index() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64 * 10.0).collect();
        // floor(10 * 0.9) = 9, floor(10 * 0.95) = 9, floor(10 * 0.99) = 9
        assert_eq!(percentile(&values, 0.9), 100.0);
        assert_eq!(percentile(&values, 0.95), 100.0);

        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.9), 91.0);
        assert_eq!(percentile(&values, 0.95), 96.0);
        assert_eq!(percentile(&values, 0.99), 100.0);
    }

    #[test]
    fn test_single_value() {
        assert_eq!(percentile(&[42.0], 0.5), 42.0);
        assert_eq!(percentile(&[42.0], 0.99), 42.0);
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(latency_percentiles(Vec::new()), LatencyPercentiles::default());
    }

    #[test]
    fn test_invalid_values_excluded() {
        let result = latency_percentiles(vec![0.0, f64::NAN, -5.0, 30.0, 10.0, 20.0]);
        assert_eq!(result.p50, 20.0);
        assert_eq!(result.p99, 30.0);

        let all_invalid = latency_percentiles(vec![0.0, f64::NAN]);
        assert_eq!(all_invalid, LatencyPercentiles::default());
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let result = latency_percentiles(vec![400.0, 100.0, 300.0, 200.0]);
        assert_eq!(result.p50, 250.0);
        assert_eq!(result.p95, 400.0);
    }
}

//! Distribution statistics over a capped sample window.
//!
//! Percentiles are computed exactly over the retained samples (sort, then
//! linear interpolation at rank `(n - 1) * p / 100`). The window is bounded,
//! so the sort stays cheap and results are reproducible for a given window.

use crate::metrics::types::HistogramStats;

/// Percentile of an ascending-sorted slice using linear interpolation.
///
/// Returns `0.0` for an empty slice. `p` is clamped to `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let last = sorted.len() - 1;
    let rank = last as f64 * p.clamp(0.0, 100.0) / 100.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let fraction = rank - lower as f64;

    if lower >= last {
        return sorted[last];
    }

    sorted[lower] * (1.0 - fraction) + sorted[lower + 1] * fraction
}

impl HistogramStats {
    /// Summarize a set of values; `None` when there are no values
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);

        let sum: f64 = sorted.iter().sum();
        Some(Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / sorted.len() as f64,
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

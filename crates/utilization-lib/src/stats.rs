//! Nearest-rank percentiles over a history window

use crate::models::Percentiles;

/// Nearest-rank percentile of an ascending-sorted slice
///
/// Selects `sorted[floor(len * pct / 100)]`, clamped to the last element.
/// No interpolation is performed. Returns 0.0 for an empty slice.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * pct / 100.0).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

impl Percentiles {
    /// Sort `values` ascending and take p50/p90/p95
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
        }
    }

    /// Copy with every value rounded to two decimal places
    pub fn rounded(&self) -> Self {
        Self {
            p50: round2(self.p50),
            p90: round2(self.p90),
            p95: round2(self.p95),
        }
    }
}

/// Round to two decimal places, ties to even
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

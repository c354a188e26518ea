//! Pure numeric helpers over sequences of numbers.

/// Sum of all values. An empty sequence sums to 0.0.
#[inline(always)]
pub fn sum(values: &[f64]) -> f64 { values.iter().sum() }

/// Smallest value, or `None` for an empty sequence. NaN entries are skipped.
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).reduce(f64::min)
}

/// Largest value, or `None` for an empty sequence. NaN entries are skipped.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).reduce(f64::max)
}

/// Arithmetic mean, or 0.0 for an empty sequence.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { sum(values) / values.len() as f64 }
}

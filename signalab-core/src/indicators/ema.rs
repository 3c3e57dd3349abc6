//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (span + 1).
//! Seed: EMA equals the first defined value of the series.

use super::series::Series;

/// EMA of an arbitrary series.
///
/// Leading missing values stay missing; the recursion is seeded by the first
/// defined value. A missing value after the seed is missing in the output and
/// restarts the recursion at the next defined value.
pub fn ema_of_series(values: &[Option<f64>], span: usize) -> Series {
    let mut result = vec![None; values.len()];
    if span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev: Option<f64> = None;

    for (i, v) in values.iter().enumerate() {
        prev = match (v, prev) {
            (Some(x), Some(p)) => Some(alpha * x + (1.0 - alpha) * p),
            (Some(x), None) => Some(*x),
            (None, _) => None,
        };
        result[i] = prev;
    }

    result
}

/// Mask the first `count` entries of a series as missing.
pub fn mask_warmup(mut values: Series, count: usize) -> Series {
    for v in values.iter_mut().take(count) {
        *v = None;
    }
    values
}

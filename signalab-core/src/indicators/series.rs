//! Rolling primitives over series with a typed missing marker.
//!
//! A `Series` has one slot per bar. `None` marks an undefined value
//! (insufficient history, a missing input, or a division by zero) and is
//! never silently turned into a number. A rolling window that touches a
//! `None` produces `None`.

use crate::domain::Bar;

/// Per-bar indicator output. `None` = missing.
pub type Series = Vec<Option<f64>>;

/// Close prices as a series, with NaN closes mapped to missing.
pub fn closes(bars: &[Bar]) -> Series {
    bars.iter().map(|b| finite(b.close)).collect()
}

/// Volumes as a series.
pub fn volumes(bars: &[Bar]) -> Series {
    bars.iter().map(|b| Some(b.volume as f64)).collect()
}

/// Map NaN / infinite values to missing.
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Divide, treating a zero or missing divisor as missing.
pub fn safe_div(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => finite(n / d),
        _ => None,
    }
}

/// Trailing simple mean over `period` values. First defined at `period - 1`.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[(i + 1 - period)..=i];
        let mut sum = 0.0;
        let mut complete = true;
        for v in window {
            match v {
                Some(x) => sum += x,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            result[i] = Some(sum / period as f64);
        }
    }

    result
}

/// Trailing sample standard deviation (divide by N-1) over `period` values.
///
/// Undefined for `period < 2`.
pub fn rolling_std(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut result = vec![None; n];
    if period < 2 || n < period {
        return result;
    }

    let means = rolling_mean(values, period);
    for i in (period - 1)..n {
        let Some(mean) = means[i] else { continue };
        let sum_sq: f64 = values[(i + 1 - period)..=i]
            .iter()
            .flatten()
            .map(|x| (x - mean) * (x - mean))
            .sum();
        result[i] = Some((sum_sq / (period - 1) as f64).sqrt());
    }

    result
}

/// Percent change from the previous value. Undefined at index 0.
pub fn pct_change(values: &[Option<f64>]) -> Series {
    let mut result = vec![None; values.len()];
    for i in 1..values.len() {
        result[i] = match (values[i], values[i - 1]) {
            (Some(curr), Some(prev)) => safe_div(Some(curr - prev), Some(prev)),
            _ => None,
        };
    }
    result
}

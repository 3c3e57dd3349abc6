//! Indicator engine.
//!
//! Every indicator implements the `Indicator` trait: bar history in, one
//! value per bar out. Values are causal (bar t only sees bars 0..=t) and
//! undefined values are `None`, never a silent zero.
//!
//! Multi-series indicators (MACD, Bollinger) are exposed as separate named
//! instances per line/band, keeping the single-series trait unchanged.
//! `IndicatorSet::compute` runs the full reference set in one pass.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod price;
pub mod rsi;
pub mod series;
pub mod set;
pub mod sma;
pub mod volatility;
pub mod volume;

pub use bollinger::{Bollinger, BollingerBand};
pub use ema::ema_of_series;
pub use macd::{Macd, MacdLine};
pub use price::{HighLowRatio, PriceChange};
pub use rsi::Rsi;
pub use series::Series;
pub use set::{IndicatorKind, IndicatorParams, IndicatorSet};
pub use sma::Sma;
pub use volatility::Volatility;
pub use volume::{VolumeRatio, VolumeSma};

use crate::domain::Bar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Every indicator must
/// pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of leading bars that are always missing.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    ///
    /// Returns a series of the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Series;
}

/// Create synthetic bars from close prices for testing.
///
/// Hourly bars: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

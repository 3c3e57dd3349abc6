//! Per-bar price features.
//!
//! - `PriceChange`: close-to-close percent change (lookback 1).
//! - `HighLowRatio`: high / low of the same bar (lookback 0, missing when low is 0).

use super::series::{closes, finite, pct_change, safe_div, Series};
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct PriceChange;

impl Indicator for PriceChange {
    fn name(&self) -> &str {
        "price_change"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        pct_change(&closes(bars))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HighLowRatio;

impl Indicator for HighLowRatio {
    fn name(&self) -> &str {
        "high_low_ratio"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        bars.iter()
            .map(|b| safe_div(finite(b.high), finite(b.low)))
            .collect()
    }
}

//! Return volatility: trailing sample stddev of close-to-close percent change.
//!
//! The percent change is undefined on the first bar, so the first value lands
//! at index `period` (lookback: period).

use super::series::{closes, pct_change, rolling_std, Series};
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Volatility {
    period: usize,
    name: String,
}

impl Volatility {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("volatility_{period}"),
        }
    }
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        rolling_std(&pct_change(&closes(bars)), self.period)
    }
}

//! Forward-return labeling.
//!
//! forward_return[i] = close[i + horizon] / close[i] - 1
//! Buy if > buy_threshold, Sell if < sell_threshold, else Hold (strict
//! comparisons). Steps whose horizon runs past the series have no label.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Label};
use crate::indicators::series::{finite, safe_div};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRule {
    pub horizon: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            horizon: 5,
            buy_threshold: 0.02,
            sell_threshold: -0.02,
        }
    }
}

impl LabelRule {
    /// Classify a forward return.
    pub fn classify(&self, forward_return: f64) -> Label {
        if forward_return > self.buy_threshold {
            Label::Buy
        } else if forward_return < self.sell_threshold {
            Label::Sell
        } else {
            Label::Hold
        }
    }

    /// Forward return at `index`, or `None` past the series bound or on bad prices.
    pub fn forward_return(&self, bars: &[Bar], index: usize) -> Option<f64> {
        let future = bars.get(index.checked_add(self.horizon)?)?;
        let now = bars.get(index)?;
        safe_div(finite(future.close), finite(now.close)).map(|r| r - 1.0)
    }

    /// One optional label per bar.
    pub fn labels(&self, bars: &[Bar]) -> Vec<Option<Label>> {
        (0..bars.len())
            .map(|i| self.forward_return(bars, i).map(|r| self.classify(r)))
            .collect()
    }
}

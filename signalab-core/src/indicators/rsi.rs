//! Relative Strength Index (RSI).
//!
//! Simple (non-exponential) rolling means of gains and losses over `period`
//! signed close-to-close deltas.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! The first bar has no predecessor and counts as a zero delta, so the first
//! value lands at index period-1.
//! avg_loss == 0 → missing (division by zero), never 100.

use super::series::{closes, rolling_mean, safe_div, Series};
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        let closes = closes(bars);
        let n = closes.len();

        let mut gains: Series = vec![None; n];
        let mut losses: Series = vec![None; n];
        for i in 0..n {
            let delta = if i == 0 {
                closes[0].map(|_| 0.0)
            } else {
                match (closes[i], closes[i - 1]) {
                    (Some(curr), Some(prev)) => Some(curr - prev),
                    _ => None,
                }
            };
            gains[i] = delta.map(|d| d.max(0.0));
            losses[i] = delta.map(|d| (-d).max(0.0));
        }

        let avg_gain = rolling_mean(&gains, self.period);
        let avg_loss = rolling_mean(&losses, self.period);

        avg_gain
            .iter()
            .zip(&avg_loss)
            .map(|(&g, &l)| safe_div(g, l).map(|rs| 100.0 - 100.0 / (1.0 + rs)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn rsi_all_gains_is_missing() {
        // No losses → avg_loss == 0 → undefined
        let bars = make_bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let result = Rsi::new(3).compute(&bars);
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let bars = make_bars(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0]);
        let result = Rsi::new(3).compute(&bars);
        assert_approx(result[3].unwrap(), 0.0, 1e-9);
    }

    #[test]
    fn rsi_mixed_known_value() {
        // Window at index 4 holds deltas -0.25, -0.48, +0.72
        // avg_gain = 0.72/3, avg_loss = 0.73/3
        // RSI = 100 - 100 / (1 + 0.72/0.73)
        let bars = make_bars(&[44.0, 44.34, 44.09, 43.61, 44.33]);
        let result = Rsi::new(3).compute(&bars);

        assert!(result[0].is_none());
        assert!(result[1].is_none());
        let expected = 100.0 - 100.0 / (1.0 + 0.72 / 0.73);
        assert_approx(result[4].unwrap(), expected, 1e-9);
    }

    #[test]
    fn rsi_first_value_at_period_minus_one() {
        // Window at index 2 = deltas [0 (first bar), +1, -2]
        let bars = make_bars(&[10.0, 11.0, 9.0, 10.0]);
        let result = Rsi::new(3).compute(&bars);
        assert!(result[1].is_none());
        let expected = 100.0 - 100.0 / (1.0 + 1.0 / 2.0);
        assert_approx(result[2].unwrap(), expected, 1e-9);
    }

    #[test]
    fn rsi_bounds() {
        let bars = make_bars(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        let result = Rsi::new(3).compute(&bars);
        for (i, v) in result.iter().enumerate() {
            if let Some(v) = v {
                assert!((0.0..=100.0).contains(v), "RSI out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn rsi_constant_price_is_missing() {
        let bars = make_bars(&[50.0; 30]);
        let result = Rsi::new(14).compute(&bars);
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_lookback() {
        assert_eq!(Rsi::new(14).lookback(), 13);
    }
}

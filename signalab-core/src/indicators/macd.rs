//! Moving Average Convergence Divergence (MACD).
//!
//! Two lines (separate Indicator instances):
//! - Line:   EMA(close, fast) - EMA(close, slow)
//! - Signal: EMA(line, signal)
//!
//! EMAs are seeded by the first close. The line is masked as missing until
//! both EMAs have seen `max(fast, slow)` closes (lookback max(fast,slow)-1);
//! the signal EMA is seeded by the first unmasked line value and masked for
//! another `signal - 1` bars.

use super::ema::{ema_of_series, mask_warmup};
use super::series::{closes, Series};
use super::Indicator;
use crate::domain::Bar;

/// Which MACD line to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Line,
    Signal,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn line(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast,
            slow,
            signal,
            line: MacdLine::Line,
            name: format!("macd_{fast}_{slow}_{signal}"),
        }
    }

    pub fn signal(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast,
            slow,
            signal,
            line: MacdLine::Signal,
            name: format!("macd_signal_{fast}_{slow}_{signal}"),
        }
    }

    fn line_lookback(&self) -> usize {
        self.fast.max(self.slow).saturating_sub(1)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            MacdLine::Line => self.line_lookback(),
            MacdLine::Signal => self.line_lookback() + self.signal.saturating_sub(1),
        }
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        let closes = closes(bars);
        let ema_fast = ema_of_series(&closes, self.fast);
        let ema_slow = ema_of_series(&closes, self.slow);

        let line: Series = ema_fast
            .iter()
            .zip(&ema_slow)
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => Some(f - s),
                _ => None,
            })
            .collect();
        let line = mask_warmup(line, self.line_lookback());

        match self.line {
            MacdLine::Line => line,
            MacdLine::Signal => mask_warmup(ema_of_series(&line, self.signal), self.lookback()),
        }
    }
}

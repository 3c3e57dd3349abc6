//! The reference indicator set, computed in one pass over a bar series.

use serde::{Deserialize, Serialize};

use super::{
    Bollinger, HighLowRatio, Indicator, Macd, PriceChange, Rsi, Series, Sma, Volatility,
    VolumeRatio, VolumeSma,
};
use crate::domain::Bar;

/// Periods and multipliers for every indicator in the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_multiplier: f64,
    pub sma_short: usize,
    pub sma_long: usize,
    pub volatility_period: usize,
    pub volume_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_multiplier: 2.0,
            sma_short: 20,
            sma_long: 50,
            volatility_period: 20,
            volume_period: 20,
        }
    }
}

impl IndicatorParams {
    /// Longest warm-up across the set: bars before the first index at which
    /// every indicator can be defined.
    pub fn warmup(&self) -> usize {
        self.indicators()
            .iter()
            .map(|(_, ind)| ind.lookback())
            .max()
            .unwrap_or(0)
    }

    /// One configured indicator per column.
    pub fn indicators(&self) -> Vec<(IndicatorKind, Box<dyn Indicator>)> {
        let bb = (self.bollinger_period, self.bollinger_multiplier);
        vec![
            (IndicatorKind::Rsi, Box::new(Rsi::new(self.rsi_period))),
            (
                IndicatorKind::Macd,
                Box::new(Macd::line(self.macd_fast, self.macd_slow, self.macd_signal)),
            ),
            (
                IndicatorKind::MacdSignal,
                Box::new(Macd::signal(self.macd_fast, self.macd_slow, self.macd_signal)),
            ),
            (IndicatorKind::BollingerUpper, Box::new(Bollinger::upper(bb.0, bb.1))),
            (IndicatorKind::BollingerMiddle, Box::new(Bollinger::middle(bb.0, bb.1))),
            (IndicatorKind::BollingerLower, Box::new(Bollinger::lower(bb.0, bb.1))),
            (IndicatorKind::SmaShort, Box::new(Sma::new(self.sma_short))),
            (IndicatorKind::SmaLong, Box::new(Sma::new(self.sma_long))),
            (
                IndicatorKind::Volatility,
                Box::new(Volatility::new(self.volatility_period)),
            ),
            (IndicatorKind::VolumeSma, Box::new(VolumeSma::new(self.volume_period))),
            (
                IndicatorKind::VolumeRatio,
                Box::new(VolumeRatio::new(self.volume_period)),
            ),
            (IndicatorKind::PriceChange, Box::new(PriceChange)),
            (IndicatorKind::HighLowRatio, Box::new(HighLowRatio)),
        ]
    }
}

/// Columns of the indicator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    MacdSignal,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    SmaShort,
    SmaLong,
    Volatility,
    VolumeSma,
    VolumeRatio,
    PriceChange,
    HighLowRatio,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 13] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::MacdSignal,
        IndicatorKind::BollingerUpper,
        IndicatorKind::BollingerMiddle,
        IndicatorKind::BollingerLower,
        IndicatorKind::SmaShort,
        IndicatorKind::SmaLong,
        IndicatorKind::Volatility,
        IndicatorKind::VolumeSma,
        IndicatorKind::VolumeRatio,
        IndicatorKind::PriceChange,
        IndicatorKind::HighLowRatio,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Per-bar indicator values for one bar series, stored column-wise.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    len: usize,
    columns: Vec<Series>,
    names: Vec<String>,
}

impl IndicatorSet {
    /// Compute every indicator for `bars`. Pure; never fails.
    pub fn compute(bars: &[Bar], params: &IndicatorParams) -> Self {
        let mut columns = vec![Vec::new(); IndicatorKind::ALL.len()];
        let mut names = vec![String::new(); IndicatorKind::ALL.len()];
        for (kind, indicator) in params.indicators() {
            columns[kind.slot()] = indicator.compute(bars);
            names[kind.slot()] = indicator.name().to_string();
        }
        Self {
            len: bars.len(),
            columns,
            names,
        }
    }

    /// Number of rows (equals the number of input bars).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Full column for one indicator.
    pub fn column(&self, kind: IndicatorKind) -> &[Option<f64>] {
        self.columns
            .get(kind.slot())
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Parameterized name of an indicator column (e.g. "rsi_14").
    pub fn name(&self, kind: IndicatorKind) -> &str {
        self.names.get(kind.slot()).map(|s| s.as_str()).unwrap_or("")
    }

    /// Value of one indicator at a bar index. `None` when missing or out of range.
    pub fn get(&self, kind: IndicatorKind, index: usize) -> Option<f64> {
        self.column(kind).get(index).copied().flatten()
    }

    /// True when every indicator is defined at `index`.
    pub fn is_complete(&self, index: usize) -> bool {
        IndicatorKind::ALL
            .iter()
            .all(|&kind| self.get(kind, index).is_some())
    }
}

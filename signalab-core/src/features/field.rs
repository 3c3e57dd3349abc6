//! Selectable feature fields.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Bar;
use crate::indicators::series::finite;
use crate::indicators::{IndicatorKind, IndicatorSet};

/// One column of a feature vector: a raw bar field or an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Rsi,
    Macd,
    MacdSignal,
    BbUpper,
    BbMiddle,
    BbLower,
    SmaShort,
    SmaLong,
    Volatility,
    VolumeRatio,
    PriceChange,
    HighLowRatio,
}

impl FeatureField {
    /// The 17-field reference feature set, in canonical order.
    pub const REFERENCE: [FeatureField; 17] = [
        FeatureField::Open,
        FeatureField::High,
        FeatureField::Low,
        FeatureField::Close,
        FeatureField::Volume,
        FeatureField::Rsi,
        FeatureField::Macd,
        FeatureField::MacdSignal,
        FeatureField::BbUpper,
        FeatureField::BbMiddle,
        FeatureField::BbLower,
        FeatureField::SmaShort,
        FeatureField::SmaLong,
        FeatureField::Volatility,
        FeatureField::VolumeRatio,
        FeatureField::PriceChange,
        FeatureField::HighLowRatio,
    ];

    /// Indicator column backing this field, if it is not a raw bar field.
    pub fn indicator(self) -> Option<IndicatorKind> {
        match self {
            FeatureField::Open
            | FeatureField::High
            | FeatureField::Low
            | FeatureField::Close
            | FeatureField::Volume => None,
            FeatureField::Rsi => Some(IndicatorKind::Rsi),
            FeatureField::Macd => Some(IndicatorKind::Macd),
            FeatureField::MacdSignal => Some(IndicatorKind::MacdSignal),
            FeatureField::BbUpper => Some(IndicatorKind::BollingerUpper),
            FeatureField::BbMiddle => Some(IndicatorKind::BollingerMiddle),
            FeatureField::BbLower => Some(IndicatorKind::BollingerLower),
            FeatureField::SmaShort => Some(IndicatorKind::SmaShort),
            FeatureField::SmaLong => Some(IndicatorKind::SmaLong),
            FeatureField::Volatility => Some(IndicatorKind::Volatility),
            FeatureField::VolumeRatio => Some(IndicatorKind::VolumeRatio),
            FeatureField::PriceChange => Some(IndicatorKind::PriceChange),
            FeatureField::HighLowRatio => Some(IndicatorKind::HighLowRatio),
        }
    }

    /// Value of this field at `index`; `None` when missing.
    pub fn value(self, bars: &[Bar], indicators: &IndicatorSet, index: usize) -> Option<f64> {
        if let Some(kind) = self.indicator() {
            return indicators.get(kind, index);
        }
        let bar = bars.get(index)?;
        let raw = match self {
            FeatureField::Open => bar.open,
            FeatureField::High => bar.high,
            FeatureField::Low => bar.low,
            FeatureField::Close => bar.close,
            _ => bar.volume as f64,
        };
        finite(raw)
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureField::Open => "open",
            FeatureField::High => "high",
            FeatureField::Low => "low",
            FeatureField::Close => "close",
            FeatureField::Volume => "volume",
            FeatureField::Rsi => "rsi",
            FeatureField::Macd => "macd",
            FeatureField::MacdSignal => "macd_signal",
            FeatureField::BbUpper => "bb_upper",
            FeatureField::BbMiddle => "bb_middle",
            FeatureField::BbLower => "bb_lower",
            FeatureField::SmaShort => "sma_short",
            FeatureField::SmaLong => "sma_long",
            FeatureField::Volatility => "volatility",
            FeatureField::VolumeRatio => "volume_ratio",
            FeatureField::PriceChange => "price_change",
            FeatureField::HighLowRatio => "high_low_ratio",
        };
        f.write_str(name)
    }
}

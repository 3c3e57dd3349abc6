//! Signalab Core: bars, indicators, features, labels and sequence windows.
//!
//! The numeric core runs in three pure stages:
//! - Indicator engine (RSI, MACD, Bollinger, moving averages, volatility,
//!   volume ratio) with typed missing values during warm-up
//! - Feature/label builder producing gap-free rows and forward-return labels
//! - Sequence windower producing fixed-length training windows
//!
//! Around it sit the data source adapters (Yahoo, CSV, synthetic), the live
//! tick stream and the feature scaler.

pub mod data;
pub mod domain;
pub mod features;
pub mod indicators;
pub mod sequence;

pub use domain::{Bar, Label};
pub use features::{FeatureBuilder, FeatureDataset, FeatureField, LabelRule, StandardScaler};
pub use indicators::{IndicatorParams, IndicatorSet};
pub use sequence::SequenceDataset;

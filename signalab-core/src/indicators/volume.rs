//! Volume indicators: trailing mean volume and the current/mean ratio.
//!
//! Lookback: period - 1. A zero mean volume makes the ratio missing.

use super::series::{rolling_mean, safe_div, volumes, Series};
use super::Indicator;
use crate::domain::Bar;

/// Trailing simple mean of volume.
#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    name: String,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("volume_sma_{period}"),
        }
    }
}

impl Indicator for VolumeSma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        rolling_mean(&volumes(bars), self.period)
    }
}

/// Current volume divided by its trailing mean.
#[derive(Debug, Clone)]
pub struct VolumeRatio {
    sma: VolumeSma,
    name: String,
}

impl VolumeRatio {
    pub fn new(period: usize) -> Self {
        Self {
            sma: VolumeSma::new(period),
            name: format!("volume_ratio_{period}"),
        }
    }
}

impl Indicator for VolumeRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.sma.lookback()
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        let mean = self.sma.compute(bars);
        volumes(bars)
            .into_iter()
            .zip(mean)
            .map(|(v, m)| safe_div(v, m))
            .collect()
    }
}

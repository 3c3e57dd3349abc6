//! Pipeline configuration loaded from TOML.
//!
//! Every section and field is optional; missing values take the reference
//! defaults. `validate()` is the only place numeric parameters are rejected.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use signalab_core::data::{BarInterval, HistoryPeriod};
use signalab_core::{FeatureField, IndicatorParams, LabelRule};
use signalab_model::{Precision, TrainConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbol: String,
    pub period: HistoryPeriod,
    pub interval: BarInterval,
    /// Read bars from this CSV file instead of the network.
    pub csv: Option<PathBuf>,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic bars when no real bars are available.
    pub synthetic_fallback: bool,
    pub synthetic_bars: usize,
    pub synthetic_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".into(),
            period: HistoryPeriod::TwoYears,
            interval: BarInterval::OneHour,
            csv: None,
            offline: false,
            synthetic_fallback: true,
            synthetic_bars: 2000,
            synthetic_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub fields: Vec<FeatureField>,
    #[serde(flatten)]
    pub indicators: IndicatorParams,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fields: FeatureField::REFERENCE.to_vec(),
            indicators: IndicatorParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub length: usize,
    pub test_fraction: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            length: 60,
            test_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub precision: Precision,
    /// Calibration samples for full int8 export.
    pub representative_samples: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            precision: Precision::Float32,
            representative_samples: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

/// Complete configuration of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub labels: LabelRule,
    pub sequence: SequenceConfig,
    pub training: TrainConfig,
    pub export: ExportConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.data.symbol.trim().is_empty() {
            return invalid("data.symbol must not be empty".into());
        }
        if self.data.synthetic_fallback && self.data.synthetic_bars == 0 {
            return invalid("data.synthetic_bars must be > 0".into());
        }

        let p = &self.features.indicators;
        for (name, value) in [
            ("rsi_period", p.rsi_period),
            ("macd_fast", p.macd_fast),
            ("macd_slow", p.macd_slow),
            ("macd_signal", p.macd_signal),
            ("bollinger_period", p.bollinger_period),
            ("sma_short", p.sma_short),
            ("sma_long", p.sma_long),
            ("volatility_period", p.volatility_period),
            ("volume_period", p.volume_period),
        ] {
            if value == 0 {
                return invalid(format!("features.{name} must be > 0"));
            }
        }
        if p.bollinger_period < 2 || p.volatility_period < 2 {
            return invalid("standard-deviation windows need at least 2 bars".into());
        }
        if !(p.bollinger_multiplier > 0.0 && p.bollinger_multiplier.is_finite()) {
            return invalid("features.bollinger_multiplier must be positive".into());
        }
        if self.features.fields.is_empty() {
            return invalid("features.fields must select at least one field".into());
        }

        let l = &self.labels;
        if l.horizon == 0 {
            return invalid("labels.horizon must be > 0".into());
        }
        if !(l.buy_threshold > 0.0) {
            return invalid("labels.buy_threshold must be positive".into());
        }
        if !(l.sell_threshold < 0.0) {
            return invalid("labels.sell_threshold must be negative".into());
        }
        if l.sell_threshold >= l.buy_threshold {
            return invalid("labels.sell_threshold must be below buy_threshold".into());
        }

        if self.sequence.length == 0 {
            return invalid("sequence.length must be > 0".into());
        }
        let f = self.sequence.test_fraction;
        if !(f > 0.0 && f < 1.0) {
            return invalid(format!("sequence.test_fraction must be in (0, 1), got {f}"));
        }

        if self.export.precision.requires_calibration() && self.export.representative_samples == 0 {
            return invalid("export.representative_samples must be > 0 for int8".into());
        }

        self.training
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Per-symbol artifact directory.
    pub fn run_dir(&self) -> PathBuf {
        self.output.dir.join(self.data.symbol.to_uppercase())
    }
}

//! Trainer configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TrainError;

/// Sequence encoder architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Lstm,
    Cnn,
}

impl ModelKind {
    /// Units of the hidden dense layer in the classification head.
    pub fn default_head_units(self) -> usize {
        match self {
            ModelKind::Lstm => 32,
            ModelKind::Cnn => 64,
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Lstm
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Lstm => f.write_str("lstm"),
            ModelKind::Cnn => f.write_str("cnn"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lstm" => Ok(ModelKind::Lstm),
            "cnn" => Ok(ModelKind::Cnn),
            other => Err(TrainError::InvalidConfig(format!(
                "unknown model kind '{other}' (expected lstm or cnn)"
            ))),
        }
    }
}

/// Hyperparameters and training policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: ModelKind,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Stacked LSTM layer sizes.
    pub lstm_units: Vec<usize>,
    /// Conv1D filter counts, one conv + max-pool block each.
    pub conv_filters: Vec<usize>,
    pub kernel_size: usize,
    /// Hidden dense units; `None` picks the per-architecture default.
    pub head_units: Option<usize>,
    /// Dropout rate after each LSTM layer, or after the CNN's hidden dense layer.
    pub dropout: f64,
    /// Epochs without validation improvement before stopping.
    pub early_stopping_patience: usize,
    /// Epochs without validation improvement before the learning rate drops.
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_learning_rate: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Lstm,
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            lstm_units: vec![128, 64],
            conv_filters: vec![64, 32],
            kernel_size: 3,
            head_units: None,
            dropout: 0.2,
            early_stopping_patience: 5,
            lr_patience: 3,
            lr_factor: 0.5,
            min_learning_rate: 1e-6,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn head_units(&self) -> usize {
        self.head_units
            .unwrap_or_else(|| self.model.default_head_units())
    }

    pub fn validate(&self) -> Result<(), TrainError> {
        let invalid = |msg: &str| Err(TrainError::InvalidConfig(msg.to_string()));
        if self.epochs == 0 {
            return invalid("epochs must be > 0");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be > 0");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate must be a positive number");
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return invalid("lr_factor must be in (0, 1)");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)");
        }
        if self.head_units() == 0 {
            return invalid("head_units must be > 0");
        }
        match self.model {
            ModelKind::Lstm if self.lstm_units.is_empty() || self.lstm_units.contains(&0) => {
                invalid("lstm_units must be non-empty and positive")
            }
            ModelKind::Cnn if self.conv_filters.is_empty() || self.conv_filters.contains(&0) => {
                invalid("conv_filters must be non-empty and positive")
            }
            ModelKind::Cnn if self.kernel_size == 0 => invalid("kernel_size must be > 0"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_architecture() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.lstm_units, vec![128, 64]);
        assert_eq!(cfg.conv_filters, vec![64, 32]);
        assert_eq!(cfg.head_units(), 32);
        assert!(cfg.validate().is_ok());

        let cnn = TrainConfig {
            model: ModelKind::Cnn,
            ..TrainConfig::default()
        };
        assert_eq!(cnn.head_units(), 64);
    }

    #[test]
    fn parse_model_kind() {
        assert_eq!("LSTM".parse::<ModelKind>().unwrap(), ModelKind::Lstm);
        assert_eq!("cnn".parse::<ModelKind>().unwrap(), ModelKind::Cnn);
        assert!("gru".parse::<ModelKind>().is_err());
    }

    #[test]
    fn rejects_bad_values() {
        for cfg in [
            TrainConfig { epochs: 0, ..TrainConfig::default() },
            TrainConfig { batch_size: 0, ..TrainConfig::default() },
            TrainConfig { learning_rate: -1.0, ..TrainConfig::default() },
            TrainConfig { lr_factor: 1.0, ..TrainConfig::default() },
            TrainConfig { lstm_units: vec![], ..TrainConfig::default() },
            TrainConfig { dropout: 1.0, ..TrainConfig::default() },
        ] {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn partial_input_keeps_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"model":"cnn","epochs":3}"#).unwrap();
        assert_eq!(cfg.model, ModelKind::Cnn);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.batch_size, 32);
    }
}

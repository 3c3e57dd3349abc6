//! Run artifacts: trained model, feature scaler, epoch history and manifest.
//!
//! Layout under `<output>/<SYMBOL>/`:
//! - `model.json`: the classifier (architecture spec + all weights)
//! - `model_scaler.json`: the fitted feature scaler
//! - `history.csv`: one row of metrics per epoch
//! - `model_quantized.bin`: the exported model at `export.precision`
//! - `manifest.json`: provenance and summary metrics

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use signalab_core::data::DataSource;
use signalab_core::{Label, StandardScaler};
use signalab_model::{EpochMetrics, ExportReport, ModelKind, Precision, SequenceClassifier};

/// Current schema version for persisted manifests.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub history: PathBuf,
    pub export: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            model: dir.join("model.json"),
            scaler: dir.join("model_scaler.json"),
            history: dir.join("history.csv"),
            export: dir.join("model_quantized.bin"),
            manifest: dir.join("manifest.json"),
        }
    }
}

/// Row counts per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub sell: usize,
    pub hold: usize,
    pub buy: usize,
}

impl ClassDistribution {
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut counts = [0usize; Label::COUNT];
        for label in labels {
            counts[label.class_index()] += 1;
        }
        Self {
            sell: counts[Label::Sell.class_index()],
            hold: counts[Label::Hold.class_index()],
            buy: counts[Label::Buy.class_index()],
        }
    }

    pub fn total(&self) -> usize {
        self.sell + self.hold + self.buy
    }
}

/// The quantized artifact written alongside the trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub precision: Precision,
    pub bytes: u64,
    pub max_weight_error: f64,
}

impl From<&ExportReport> for ExportSummary {
    fn from(report: &ExportReport) -> Self {
        Self {
            precision: report.precision,
            bytes: report.bytes,
            max_weight_error: report.max_weight_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub config_hash: String,
    pub dataset_hash: String,
    pub data_source: DataSource,
    pub synthetic: bool,
    pub bars: usize,
    pub feature_rows: usize,
    pub sequences: usize,
    pub train_sequences: usize,
    pub test_sequences: usize,
    pub class_distribution: ClassDistribution,
    pub model: ModelKind,
    pub parameters: usize,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub test_loss: Option<f64>,
    pub test_accuracy: Option<f64>,
    #[serde(default)]
    pub export: Option<ExportSummary>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_error(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let content = std::fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_model(path: &Path, model: &SequenceClassifier) -> Result<(), ArtifactError> {
    write_json(path, model)
}

pub fn load_model(path: &Path) -> Result<SequenceClassifier, ArtifactError> {
    read_json(path)
}

pub fn save_scaler(path: &Path, scaler: &StandardScaler) -> Result<(), ArtifactError> {
    write_json(path, scaler)
}

pub fn load_scaler(path: &Path) -> Result<StandardScaler, ArtifactError> {
    read_json(path)
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, ArtifactError> {
    read_json(path)
}

pub fn write_history_csv(path: &Path, history: &[EpochMetrics]) -> Result<(), ArtifactError> {
    let mut writer = csv::Writer::from_path(path)?;
    for metrics in history {
        writer.serialize(metrics)?;
    }
    writer.flush().map_err(io_error(path))
}

pub fn read_history_csv(path: &Path) -> Result<Vec<EpochMetrics>, ArtifactError> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.deserialize().collect::<Result<Vec<_>, _>>()?)
}

/// Write the model, scaler, history and manifest into `dir`, creating it if
/// needed. The quantized export is written by the pipeline beforehand.
pub fn write_artifacts(
    dir: &Path,
    model: &SequenceClassifier,
    scaler: &StandardScaler,
    history: &[EpochMetrics],
    manifest: &RunManifest,
) -> Result<ArtifactPaths, ArtifactError> {
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    let paths = ArtifactPaths::in_dir(dir);
    save_model(&paths.model, model)?;
    save_scaler(&paths.scaler, scaler)?;
    write_history_csv(&paths.history, history)?;
    write_json(&paths.manifest, manifest)?;
    info!(dir = %dir.display(), "wrote run artifacts");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_distribution_counts_labels() {
        let dist = ClassDistribution::from_labels(&[
            Label::Buy,
            Label::Hold,
            Label::Hold,
            Label::Sell,
            Label::Buy,
            Label::Buy,
        ]);
        assert_eq!(dist, ClassDistribution { sell: 1, hold: 2, buy: 3 });
        assert_eq!(dist.total(), 6);
    }

    #[test]
    fn history_csv_round_trips_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let history = vec![
            EpochMetrics {
                epoch: 1,
                train_loss: 1.1,
                train_accuracy: 0.4,
                val_loss: Some(1.05),
                val_accuracy: Some(0.45),
                learning_rate: 0.001,
            },
            EpochMetrics {
                epoch: 2,
                train_loss: 0.9,
                train_accuracy: 0.5,
                val_loss: None,
                val_accuracy: None,
                learning_rate: 0.0005,
            },
        ];
        write_history_csv(&path, &history).unwrap();
        assert_eq!(read_history_csv(&path).unwrap(), history);

        let text = std::fs::read_to_string(&path).unwrap();
        let header = "epoch,train_loss,train_accuracy,val_loss,val_accuracy,learning_rate";
        assert!(text.starts_with(header));
    }

    #[test]
    fn missing_manifest_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        match read_manifest(&path) {
            Err(ArtifactError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {other:?}"),
        }
    }
}

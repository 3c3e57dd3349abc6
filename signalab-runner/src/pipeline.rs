//! End-to-end training pipeline.
//!
//! `run_training` = load bars → indicators → features/labels → scale →
//! window → chronological split → train → export → persist artifacts.

use std::path::Path;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use signalab_core::data::{DataProvider, DataSource};
use signalab_core::{
    Bar, FeatureBuilder, FeatureDataset, IndicatorSet, SequenceDataset, StandardScaler,
};
use signalab_model::{
    export_model, DatasetSamples, ExportError, ExportReport, Precision, RepresentativeDataset,
    SequenceClassifier, TrainError, TrainReport, Trainer,
};

use crate::artifacts::{
    write_artifacts, ArtifactError, ArtifactPaths, ClassDistribution, ExportSummary, RunManifest,
    SCHEMA_VERSION,
};
use crate::config::{ConfigError, PipelineConfig};
use crate::data_loader::{load_bars, LoadError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Load(#[from] LoadError),

    #[error(
        "not enough data: {bars} bars gave {rows} feature rows and {sequences} sequences of \
         length {length}, too few to leave any for training"
    )]
    NotEnoughData {
        bars: usize,
        rows: usize,
        sequences: usize,
        length: usize,
    },

    #[error("training error: {0}")]
    Train(#[from] TrainError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Scaled feature rows, the fitted scaler and the windowed sequences.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub features: FeatureDataset,
    pub scaler: StandardScaler,
    pub sequences: SequenceDataset,
}

/// Pure feature stage: no I/O, never fails.
pub fn prepare_dataset(bars: &[Bar], config: &PipelineConfig) -> PreparedDataset {
    let indicators = IndicatorSet::compute(bars, &config.features.indicators);
    let builder = FeatureBuilder::new(config.features.fields.clone(), config.labels.clone());
    let dataset = builder.build(bars, &indicators);

    let (scaler, scaled) = StandardScaler::fit_transform(&dataset.features);
    let features = dataset.with_features(scaled);
    let sequences =
        SequenceDataset::window(&features.features, &features.labels, config.sequence.length);

    info!(
        bars = bars.len(),
        rows = features.len(),
        sequences = sequences.len(),
        warmup = config.features.indicators.warmup(),
        "prepared dataset"
    );
    PreparedDataset {
        features,
        scaler,
        sequences,
    }
}

/// Everything a finished training run produced.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub symbol: String,
    pub source: DataSource,
    pub model: SequenceClassifier,
    pub scaler: StandardScaler,
    pub report: TrainReport,
    pub manifest: RunManifest,
    pub artifacts: ArtifactPaths,
    pub export: ExportReport,
    /// Held-out sequences, kept for export calibration and smoke tests.
    pub test: SequenceDataset,
}

pub fn run_training(
    config: &PipelineConfig,
    provider: Option<&dyn DataProvider>,
) -> Result<TrainingRun, PipelineError> {
    config.validate()?;
    let loaded = load_bars(&config.data, provider)?;
    let prepared = prepare_dataset(&loaded.bars, config);

    let (train, test) = prepared
        .sequences
        .split_chronological(config.sequence.test_fraction);
    if train.is_empty() {
        return Err(PipelineError::NotEnoughData {
            bars: loaded.bars.len(),
            rows: prepared.features.len(),
            sequences: prepared.sequences.len(),
            length: config.sequence.length,
        });
    }

    let trainer = Trainer::new(config.training.clone())?;
    let (model, report) = trainer.fit(&train, &test)?;

    // Calibrate on held-out data when there is any.
    let run_dir = config.run_dir();
    let calibration = if test.is_empty() { &train } else { &test };
    let export = export_trained(
        &model,
        config.export.precision,
        calibration,
        config.export.representative_samples,
        &ArtifactPaths::in_dir(&run_dir).export,
    )?;

    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        symbol: loaded.symbol.clone(),
        created_at: Utc::now(),
        config_hash: config.config_hash(),
        dataset_hash: loaded.dataset_hash.clone(),
        data_source: loaded.source,
        synthetic: loaded.is_synthetic(),
        bars: loaded.bars.len(),
        feature_rows: prepared.features.len(),
        sequences: prepared.sequences.len(),
        train_sequences: train.len(),
        test_sequences: test.len(),
        class_distribution: ClassDistribution::from_labels(&prepared.sequences.labels),
        model: report.model,
        parameters: report.parameters,
        epochs_run: report.history.len(),
        best_epoch: report.best_epoch,
        stopped_early: report.stopped_early,
        test_loss: report.test.as_ref().map(|e| e.loss),
        test_accuracy: report.test.as_ref().map(|e| e.accuracy),
        export: Some(ExportSummary::from(&export)),
    };

    let artifacts = write_artifacts(
        &run_dir,
        &model,
        &prepared.scaler,
        &report.history,
        &manifest,
    )?;

    info!(
        symbol = %loaded.symbol,
        synthetic = loaded.is_synthetic(),
        test_accuracy = ?manifest.test_accuracy,
        export_bytes = export.bytes,
        dir = %artifacts.dir.display(),
        "training run complete"
    );

    Ok(TrainingRun {
        symbol: loaded.symbol,
        source: loaded.source,
        model,
        scaler: prepared.scaler,
        report,
        manifest,
        artifacts,
        export,
        test,
    })
}

/// Export a trained model. Full int8 calibrates on up to
/// `representative_samples` of `calibration`.
pub fn export_trained(
    model: &SequenceClassifier,
    precision: Precision,
    calibration: &SequenceDataset,
    representative_samples: usize,
    path: &Path,
) -> Result<ExportReport, PipelineError> {
    let mut samples = DatasetSamples::new(calibration, representative_samples);
    let representative: Option<&mut dyn RepresentativeDataset> =
        precision.requires_calibration().then_some(&mut samples as &mut dyn RepresentativeDataset);
    Ok(export_model(model, precision, representative, path)?)
}

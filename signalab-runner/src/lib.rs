//! Signalab Runner: configuration, bar loading, training orchestration and
//! run artifacts.
//!
//! This crate wires `signalab-core` and `signalab-model` together:
//! - TOML pipeline configuration with validation and a content hash
//! - Bar loading with CSV / provider / synthetic fallback
//! - The end-to-end training pipeline and quantized export
//! - Model, scaler, history and manifest persistence

pub mod artifacts;
pub mod config;
pub mod data_loader;
pub mod pipeline;

pub use artifacts::{
    load_model, load_scaler, read_manifest, ArtifactError, ArtifactPaths, ClassDistribution,
    ExportSummary, RunManifest,
};
pub use config::{ConfigError, PipelineConfig};
pub use data_loader::{load_bars, LoadError, LoadedBars};
pub use pipeline::{
    export_trained, prepare_dataset, run_training, PipelineError, PreparedDataset, TrainingRun,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn training_run_is_send() {
        assert_send::<TrainingRun>();
    }
}

//! Full training runs on synthetic bars written to a temporary directory.

use signalab_core::data::DataSource;
use signalab_model::{ModelKind, Precision, QuantizedModel};
use signalab_runner::artifacts::read_history_csv;
use signalab_runner::{
    export_trained, load_model, load_scaler, prepare_dataset, read_manifest, run_training,
    PipelineConfig, PipelineError,
};

fn small_config(output: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data.offline = true;
    config.data.synthetic_bars = 300;
    config.sequence.length = 10;
    config.training.epochs = 2;
    config.training.lstm_units = vec![4];
    config.training.conv_filters = vec![4];
    config.training.head_units = Some(4);
    config.training.dropout = 0.0;
    config.output.dir = output.to_path_buf();
    config
}

#[test]
fn prepared_dataset_is_scaled_and_windowed() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let bars = signalab_core::data::SyntheticProvider::new(300, 42)
        .generate(config.data.interval)
        .unwrap();
    let prepared = prepare_dataset(&bars, &config);

    let warmup = config.features.indicators.warmup();
    assert_eq!(prepared.features.len(), 300 - warmup - config.labels.horizon);
    assert!(!prepared.features.has_missing());
    assert_eq!(prepared.sequences.len(), prepared.features.len() - 10);
    assert_eq!(prepared.sequences.feature_count(), 17);
    assert_eq!(prepared.scaler.width(), 17);

    for col in prepared.features.features.columns() {
        let mean = col.sum() / col.len() as f64;
        assert!(mean.abs() < 1e-9);
    }
}

#[test]
fn offline_run_trains_on_synthetic_data_and_persists_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let run = run_training(&config, None).unwrap();

    assert_eq!(run.source, DataSource::Synthetic);
    assert!(run.manifest.synthetic);
    assert_eq!(run.manifest.bars, 300);
    assert_eq!(
        run.manifest.train_sequences + run.manifest.test_sequences,
        run.manifest.sequences
    );
    assert_eq!(run.manifest.class_distribution.total(), run.manifest.sequences);
    assert_eq!(run.manifest.config_hash, config.config_hash());
    assert_eq!(run.manifest.model, ModelKind::Lstm);
    assert_eq!(run.artifacts.dir, dir.path().join("AAPL"));

    for path in [
        &run.artifacts.model,
        &run.artifacts.scaler,
        &run.artifacts.history,
        &run.artifacts.export,
        &run.artifacts.manifest,
    ] {
        assert!(path.exists(), "missing {}", path.display());
    }

    let model = load_model(&run.artifacts.model).unwrap();
    assert_eq!(model.spec(), run.model.spec());
    let seq = run.test.sequence(0);
    let a = model.predict_proba(seq).unwrap();
    let b = run.model.predict_proba(seq).unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-9);
    }

    let scaler = load_scaler(&run.artifacts.scaler).unwrap();
    assert_eq!(scaler.width(), run.scaler.width());

    let manifest = read_manifest(&run.artifacts.manifest).unwrap();
    assert_eq!(manifest.dataset_hash, run.manifest.dataset_hash);
    assert_eq!(manifest.sequences, run.manifest.sequences);

    let history = read_history_csv(&run.artifacts.history).unwrap();
    assert_eq!(history.len(), run.report.history.len());
}

#[test]
fn run_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let a = run_training(&config, None).unwrap();
    let b = run_training(&config, None).unwrap();
    assert_eq!(a.manifest.dataset_hash, b.manifest.dataset_hash);
    assert_eq!(a.model.tensors(), b.model.tensors());
}

#[test]
fn too_few_bars_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.data.synthetic_bars = 60;
    assert!(matches!(
        run_training(&config, None),
        Err(PipelineError::NotEnoughData { bars: 60, .. })
    ));
}

#[test]
fn a_split_without_training_sequences_is_not_enough_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    // Five sequences; a 0.9 test fraction puts all of them in the test split.
    config.data.synthetic_bars = config.features.indicators.warmup()
        + config.labels.horizon
        + config.sequence.length
        + 5;
    config.sequence.test_fraction = 0.9;
    match run_training(&config, None) {
        Err(PipelineError::NotEnoughData { sequences, .. }) => assert_eq!(sequences, 5),
        other => panic!("expected NotEnoughData, got {:?}", other.err()),
    }
}

#[test]
fn training_run_exports_at_the_configured_precision() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.export.precision = Precision::FullInt8;
    config.export.representative_samples = 8;
    let run = run_training(&config, None).unwrap();

    assert_eq!(run.export.path, run.artifacts.export);
    assert_eq!(run.export.precision, Precision::FullInt8);
    let on_disk = std::fs::metadata(&run.artifacts.export).unwrap().len();
    assert_eq!(run.export.bytes, on_disk);

    let summary = read_manifest(&run.artifacts.manifest).unwrap().export.unwrap();
    assert_eq!(summary.precision, Precision::FullInt8);
    assert_eq!(summary.bytes, on_disk);

    let loaded = QuantizedModel::load(&run.artifacts.export).unwrap();
    assert!(loaded.input_quantization.is_some());
}

#[test]
fn trained_model_exports_at_every_precision() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let run = run_training(&config, None).unwrap();

    for precision in [
        Precision::Float32,
        Precision::Float16,
        Precision::DynamicInt8,
        Precision::FullInt8,
    ] {
        let path = dir.path().join(format!("model_{precision}.bin"));
        let report = export_trained(&run.model, precision, &run.test, 20, &path).unwrap();
        assert!(report.bytes > 0);

        let loaded = QuantizedModel::load(&path).unwrap();
        assert_eq!(loaded.input_quantization.is_some(), precision == Precision::FullInt8);
        let probs = loaded
            .predictor()
            .unwrap()
            .predict_proba(run.test.sequence(0))
            .unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-5);
    }
}

//! Signalab CLI: fetch, train, export and stream commands.
//!
//! Commands:
//! - `fetch` download bars from Yahoo Finance into a CSV file
//! - `train` run the full training pipeline from a TOML config and flags
//! - `export` quantize a trained model into a compact binary artifact
//! - `stream` print live ticks from a WebSocket feed

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signalab_core::data::{
    fetch_history_or_empty, write_bars_csv, BarInterval, CircuitBreaker, DataProvider,
    HistoryPeriod, TickStream, WebSocketSource, YahooProvider,
};
use signalab_model::{export_model, ModelKind, Precision, QuantizedModel, RandomNormalSamples};
use signalab_runner::{load_model, run_training, PipelineConfig};

#[derive(Parser)]
#[command(name = "signalab", about = "Signalab: trading-signal model training pipeline")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download historical bars and write them to CSV.
    Fetch {
        symbol: String,

        /// History period: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.
        #[arg(long, default_value = "1y")]
        period: HistoryPeriod,

        /// Bar interval: 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo.
        #[arg(long, default_value = "1h")]
        interval: BarInterval,

        /// Output CSV file. Defaults to data/<SYMBOL>.csv.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Train a sequence classifier and write run artifacts.
    Train {
        /// Path to a TOML pipeline config.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        /// Model architecture: lstm or cnn.
        #[arg(long)]
        model: Option<ModelKind>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        sequence_length: Option<usize>,

        /// Train on bars from this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Offline mode: no network access.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Output directory for artifacts.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Quantize a trained model.
    Export {
        /// Trained model JSON (model.json from a training run).
        #[arg(long)]
        model: PathBuf,

        /// f32, f16, dynamic or int8.
        #[arg(long, default_value = "f32")]
        precision: Precision,

        /// Representative samples for int8 calibration.
        #[arg(long, default_value_t = 100)]
        samples: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output artifact path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Print live ticks from a WebSocket feed.
    Stream {
        /// WebSocket URL (ws:// or wss://).
        #[arg(long)]
        url: String,

        #[arg(long)]
        symbol: String,

        /// Ticks kept in the buffer.
        #[arg(long, default_value_t = 1000)]
        capacity: usize,

        /// Stop after this many seconds.
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Fetch {
            symbol,
            period,
            interval,
            out,
        } => run_fetch(symbol, period, interval, out),
        Commands::Train {
            config,
            symbol,
            model,
            epochs,
            batch_size,
            sequence_length,
            csv,
            offline,
            output_dir,
        } => {
            let mut cfg = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(symbol) = symbol {
                cfg.data.symbol = symbol;
            }
            if let Some(model) = model {
                cfg.training.model = model;
            }
            if let Some(epochs) = epochs {
                cfg.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                cfg.training.batch_size = batch_size;
            }
            if let Some(length) = sequence_length {
                cfg.sequence.length = length;
            }
            if csv.is_some() {
                cfg.data.csv = csv;
            }
            if let Some(dir) = output_dir {
                cfg.output.dir = dir;
            }
            cfg.data.offline |= offline;
            run_train(cfg)
        }
        Commands::Export {
            model,
            precision,
            samples,
            seed,
            out,
        } => run_export(model, precision, samples, seed, out),
        Commands::Stream {
            url,
            symbol,
            capacity,
            seconds,
        } => run_stream(url, symbol, capacity, seconds),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn yahoo_provider() -> Result<YahooProvider> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(YahooProvider::new(circuit_breaker)?)
}

fn run_fetch(
    symbol: String,
    period: HistoryPeriod,
    interval: BarInterval,
    out: Option<PathBuf>,
) -> Result<()> {
    let provider = yahoo_provider()?;
    let bars = fetch_history_or_empty(&provider, &symbol, period, interval);
    if bars.is_empty() {
        bail!("no bars returned for {symbol} ({period}, {interval})");
    }

    let path = out
        .unwrap_or_else(|| PathBuf::from("data").join(format!("{}.csv", symbol.to_uppercase())));
    write_bars_csv(&path, &bars)?;
    println!(
        "{symbol}: {} bars ({} .. {}) -> {}",
        bars.len(),
        bars[0].timestamp,
        bars[bars.len() - 1].timestamp,
        path.display()
    );
    Ok(())
}

fn run_train(config: PipelineConfig) -> Result<()> {
    config.validate()?;
    info!(
        symbol = %config.data.symbol,
        model = %config.training.model,
        config_hash = %config.config_hash(),
        "starting training run"
    );
    let provider = if config.data.offline || config.data.csv.is_some() {
        None
    } else {
        Some(yahoo_provider()?)
    };
    let provider_ref = provider.as_ref().map(|p| p as &dyn DataProvider);

    let run = run_training(&config, provider_ref)?;
    let m = &run.manifest;

    println!();
    println!("=== Training summary: {} ===", run.symbol);
    if m.synthetic {
        println!("  data:            SYNTHETIC ({} bars)", m.bars);
    } else {
        println!("  data:            {} bars", m.bars);
    }
    println!("  feature rows:    {}", m.feature_rows);
    println!(
        "  sequences:       {} (train {}, test {})",
        m.sequences, m.train_sequences, m.test_sequences
    );
    println!(
        "  classes:         sell {} / hold {} / buy {}",
        m.class_distribution.sell, m.class_distribution.hold, m.class_distribution.buy
    );
    println!("  model:           {} ({} parameters)", m.model, m.parameters);
    println!(
        "  epochs:          {} (best {}{})",
        m.epochs_run,
        m.best_epoch,
        if m.stopped_early { ", stopped early" } else { "" }
    );
    if let Some(test) = &run.report.test {
        println!("  test loss:       {:.4}", test.loss);
        println!("  test accuracy:   {:.2}%", test.accuracy * 100.0);
    }
    println!(
        "  export:          {} ({}, {:.2} KB)",
        run.export.path.display(),
        run.export.precision,
        run.export.kilobytes()
    );
    println!("  artifacts:       {}", run.artifacts.dir.display());
    Ok(())
}

fn run_export(
    model_path: PathBuf,
    precision: Precision,
    samples: usize,
    seed: u64,
    out: PathBuf,
) -> Result<()> {
    let model = load_model(&model_path)
        .with_context(|| format!("loading model from {}", model_path.display()))?;

    let mut representative = RandomNormalSamples::new(model.spec().input_shape(), samples, seed);
    let report = if precision.requires_calibration() {
        if samples == 0 {
            bail!("--samples must be > 0 for int8 export");
        }
        export_model(&model, precision, Some(&mut representative), &out)?
    } else {
        export_model(&model, precision, None, &out)?
    };

    // Smoke-test the artifact.
    let quantized = QuantizedModel::load(&out)?;
    let zeros = Array2::<f64>::zeros(model.spec().input_shape());
    let probs = quantized.predictor()?.predict_proba(zeros.view())?;

    println!(
        "exported {} ({}, {} parameters, {:.2} KB, max weight error {:.2e})",
        out.display(),
        report.precision,
        report.parameters,
        report.kilobytes(),
        report.max_weight_error
    );
    println!(
        "smoke test: sell {:.3} / hold {:.3} / buy {:.3}",
        probs[0], probs[1], probs[2]
    );
    Ok(())
}

fn run_stream(url: String, symbol: String, capacity: usize, seconds: u64) -> Result<()> {
    if capacity == 0 {
        bail!("--capacity must be > 0");
    }
    let stream = TickStream::new(symbol, capacity);
    stream.subscribe(|tick| {
        println!(
            "{} {:>10.2} {:>+8.2} ({:+.2}%) vol {}",
            tick.symbol, tick.price, tick.change, tick.change_percent, tick.volume
        );
    });

    let handle = stream.spawn_listener(WebSocketSource::new(url))?;
    let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
    while stream.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    stream.stop();
    if handle.join().is_err() {
        bail!("stream listener panicked");
    }

    println!("buffered {} ticks", stream.buffered());
    if let Some(last) = stream.latest() {
        println!("last: {} @ {:.2} ({})", last.symbol, last.price, last.timestamp);
    }
    Ok(())
}

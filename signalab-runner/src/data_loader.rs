//! Bar loading for the training pipeline.
//!
//! Resolution order:
//! 1. `data.csv` set → read that file; a read error or an empty file fails
//! 2. Online and a provider given → fetch history from it
//! 3. Nothing usable and `synthetic_fallback` → seeded synthetic bars (tagged)
//! 4. Otherwise → `LoadError::NoData`
//!
//! Provider failures never propagate; they are logged and treated as an
//! empty series so the fallback can take over. An explicit CSV file is never
//! replaced by synthetic data.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use signalab_core::data::{
    CsvProvider, DataError, DataProvider, DataSource, FetchResult, SyntheticProvider,
};
use signalab_core::domain::sort_and_dedup;
use signalab_core::Bar;

use crate::config::DataConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bars available for '{symbol}' (enable data.synthetic_fallback to train on synthetic data)")]
    NoData { symbol: String },

    #[error("csv file {} contains no bars", path.display())]
    EmptyCsv { path: PathBuf },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Bars plus their provenance.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub source: DataSource,
    /// BLAKE3 over every bar, in order.
    pub dataset_hash: String,
}

impl LoadedBars {
    pub fn is_synthetic(&self) -> bool {
        self.source.is_synthetic()
    }
}

pub fn load_bars(
    config: &DataConfig,
    provider: Option<&dyn DataProvider>,
) -> Result<LoadedBars, LoadError> {
    let symbol = config.symbol.as_str();

    let fetched = if let Some(path) = &config.csv {
        Some(read_csv(path, config)?)
    } else if config.offline {
        None
    } else {
        provider
            .filter(|p| p.is_available())
            .and_then(|p| fetch_or_warn(p, config))
    };

    let (bars, source) = match fetched {
        Some(result) => (result.bars, result.source),
        None if config.synthetic_fallback => {
            warn!(symbol, "no real bars available, generating synthetic data");
            let synthetic = SyntheticProvider::new(config.synthetic_bars, config.synthetic_seed);
            let result = synthetic.fetch_history(symbol, config.period, config.interval)?;
            (result.bars, DataSource::Synthetic)
        }
        None => {
            return Err(LoadError::NoData {
                symbol: symbol.to_string(),
            })
        }
    };

    let bars = sort_and_dedup(bars);
    info!(symbol, bars = bars.len(), source = ?source, "loaded bars");
    Ok(LoadedBars {
        symbol: symbol.to_string(),
        dataset_hash: dataset_hash(&bars),
        bars,
        source,
    })
}

fn read_csv(path: &Path, config: &DataConfig) -> Result<FetchResult, LoadError> {
    let result =
        CsvProvider::file(path).fetch_history(&config.symbol, config.period, config.interval)?;
    if result.bars.is_empty() {
        return Err(LoadError::EmptyCsv {
            path: path.to_path_buf(),
        });
    }
    Ok(result)
}

/// Fetch through `provider`; errors and empty results become `None`.
fn fetch_or_warn(provider: &dyn DataProvider, config: &DataConfig) -> Option<FetchResult> {
    match provider.fetch_history(&config.symbol, config.period, config.interval) {
        Ok(result) if !result.bars.is_empty() => Some(result),
        Ok(_) => {
            warn!(provider = provider.name(), symbol = %config.symbol, "provider returned no bars");
            None
        }
        Err(e) => {
            warn!(
                provider = provider.name(),
                symbol = %config.symbol,
                error = %e,
                "history fetch failed"
            );
            None
        }
    }
}

/// Deterministic BLAKE3 hash over timestamps and OHLCV values.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalab_core::data::{write_bars_csv, BarInterval, HistoryPeriod};

    struct DownProvider;

    impl DataProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn fetch_history(
            &self,
            _symbol: &str,
            _period: HistoryPeriod,
            _interval: BarInterval,
        ) -> Result<FetchResult, DataError> {
            Err(DataError::NetworkUnreachable("connection refused".into()))
        }
    }

    fn small_config() -> DataConfig {
        DataConfig {
            synthetic_bars: 120,
            ..DataConfig::default()
        }
    }

    #[test]
    fn failed_fetch_falls_back_to_synthetic() {
        let loaded = load_bars(&small_config(), Some(&DownProvider)).unwrap();
        assert!(loaded.is_synthetic());
        assert_eq!(loaded.bars.len(), 120);
        assert_eq!(loaded.dataset_hash.len(), 64);
    }

    #[test]
    fn no_fallback_is_an_error() {
        let config = DataConfig {
            synthetic_fallback: false,
            ..small_config()
        };
        assert!(matches!(
            load_bars(&config, Some(&DownProvider)),
            Err(LoadError::NoData { .. })
        ));
    }

    #[test]
    fn offline_never_calls_the_provider() {
        let config = DataConfig {
            offline: true,
            ..small_config()
        };
        let loaded = load_bars(&config, Some(&DownProvider)).unwrap();
        assert!(loaded.is_synthetic());
    }

    #[test]
    fn csv_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let bars = SyntheticProvider::new(50, 3).generate(BarInterval::OneDay).unwrap();
        write_bars_csv(&path, &bars).unwrap();

        let config = DataConfig {
            csv: Some(path),
            ..small_config()
        };
        let loaded = load_bars(&config, Some(&DownProvider)).unwrap();
        assert_eq!(loaded.source, DataSource::CsvImport);
        assert_eq!(loaded.bars.len(), 50);
        assert_eq!(loaded.dataset_hash, dataset_hash(&bars));
    }

    #[test]
    fn unreadable_csv_is_an_error_not_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let config = DataConfig {
            csv: Some(dir.path().join("does_not_exist.csv")),
            synthetic_fallback: true,
            ..small_config()
        };
        assert!(matches!(
            load_bars(&config, Some(&DownProvider)),
            Err(LoadError::Data(_))
        ));
    }

    #[test]
    fn empty_csv_is_an_error_not_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_bars_csv(&path, &[]).unwrap();

        let config = DataConfig {
            csv: Some(path.clone()),
            synthetic_fallback: true,
            ..small_config()
        };
        match load_bars(&config, None) {
            Err(LoadError::EmptyCsv { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected EmptyCsv, got {other:?}"),
        }
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let bars = SyntheticProvider::new(20, 1).generate(BarInterval::OneHour).unwrap();
        let mut changed = bars.clone();
        changed[5].close += 0.01;
        assert_eq!(dataset_hash(&bars), dataset_hash(&bars));
        assert_ne!(dataset_hash(&bars), dataset_hash(&changed));
    }
}

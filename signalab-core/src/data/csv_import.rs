//! CSV bar files: the offline provider and the writer used by `fetch`.
//!
//! Header: `timestamp,open,high,low,close,volume` with RFC 3339 timestamps.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::provider::{BarInterval, DataError, DataProvider, DataSource, FetchResult, HistoryPeriod};
use crate::domain::{sort_and_dedup, Bar};

/// Read every bar from a CSV file, sorted and deduplicated.
pub fn read_bars_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    let mut rejected = 0usize;
    for record in reader.deserialize::<Bar>() {
        let bar = record?;
        if bar.is_void() {
            rejected += 1;
            continue;
        }
        bars.push(bar);
    }
    if rejected > 0 {
        warn!(path = %path.display(), rejected, "skipped void rows");
    }
    Ok(sort_and_dedup(bars))
}

pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for bar in bars {
        writer.serialize(bar)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), bars = bars.len(), "wrote bars");
    Ok(())
}

/// Reads `<dir>/<SYMBOL>.csv`, or one fixed file for every symbol.
///
/// Files are returned whole; `period` and `interval` describe how the file
/// was produced and are not re-applied.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    location: Location,
}

#[derive(Debug, Clone)]
enum Location {
    Directory(PathBuf),
    File(PathBuf),
}

impl CsvProvider {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(dir.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        match &self.location {
            Location::Directory(dir) => dir.join(format!("{}.csv", symbol.to_uppercase())),
            Location::File(path) => path.clone(),
        }
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch_history(
        &self,
        symbol: &str,
        _period: HistoryPeriod,
        _interval: BarInterval,
    ) -> Result<FetchResult, DataError> {
        let bars = read_bars_csv(&self.path_for(symbol))?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::CsvImport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(hour: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 500,
        }
    }

    #[test]
    fn write_then_read_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("AAPL.csv");
        let bars = vec![bar(2, 11.0), bar(1, 10.0), bar(2, 99.0)];
        write_bars_csv(&path, &bars).unwrap();

        let loaded = read_bars_csv(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], bar(1, 10.0));
        assert_eq!(loaded[1].close, 11.0);
    }

    #[test]
    fn directory_provider_uses_symbol_file() {
        let dir = tempfile::tempdir().unwrap();
        write_bars_csv(&dir.path().join("MSFT.csv"), &[bar(0, 5.0)]).unwrap();

        let provider = CsvProvider::directory(dir.path());
        let result = provider
            .fetch_history("msft", HistoryPeriod::OneYear, BarInterval::OneHour)
            .unwrap();
        assert_eq!(result.source, DataSource::CsvImport);
        assert_eq!(result.bars.len(), 1);
        assert!(provider
            .fetch_history("NOPE", HistoryPeriod::OneYear, BarInterval::OneHour)
            .is_err());
    }
}

//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over bar sources (Yahoo Finance, CSV
//! import, synthetic) so the pipeline can swap implementations and tests can
//! run offline.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::{sort_and_dedup, Bar};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("unknown {kind} '{value}'")]
    InvalidParameter { kind: &'static str, value: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Synthetic,
}

impl DataSource {
    pub fn is_synthetic(self) -> bool {
        self == DataSource::Synthetic
    }
}

/// How far back a history request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPeriod {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl HistoryPeriod {
    pub const ALL: [HistoryPeriod; 11] = [
        HistoryPeriod::OneDay,
        HistoryPeriod::FiveDays,
        HistoryPeriod::OneMonth,
        HistoryPeriod::ThreeMonths,
        HistoryPeriod::SixMonths,
        HistoryPeriod::OneYear,
        HistoryPeriod::TwoYears,
        HistoryPeriod::FiveYears,
        HistoryPeriod::TenYears,
        HistoryPeriod::YearToDate,
        HistoryPeriod::Max,
    ];

    /// Provider query-string value.
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryPeriod::OneDay => "1d",
            HistoryPeriod::FiveDays => "5d",
            HistoryPeriod::OneMonth => "1mo",
            HistoryPeriod::ThreeMonths => "3mo",
            HistoryPeriod::SixMonths => "6mo",
            HistoryPeriod::OneYear => "1y",
            HistoryPeriod::TwoYears => "2y",
            HistoryPeriod::FiveYears => "5y",
            HistoryPeriod::TenYears => "10y",
            HistoryPeriod::YearToDate => "ytd",
            HistoryPeriod::Max => "max",
        }
    }
}

impl Default for HistoryPeriod {
    fn default() -> Self {
        HistoryPeriod::OneYear
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryPeriod {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HistoryPeriod::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataError::InvalidParameter {
                kind: "period",
                value: s.to_string(),
            })
    }
}

/// Bar spacing of a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    SixtyMinutes,
    #[serde(rename = "90m")]
    NinetyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
}

impl BarInterval {
    pub const ALL: [BarInterval; 13] = [
        BarInterval::OneMinute,
        BarInterval::TwoMinutes,
        BarInterval::FiveMinutes,
        BarInterval::FifteenMinutes,
        BarInterval::ThirtyMinutes,
        BarInterval::SixtyMinutes,
        BarInterval::NinetyMinutes,
        BarInterval::OneHour,
        BarInterval::OneDay,
        BarInterval::FiveDays,
        BarInterval::OneWeek,
        BarInterval::OneMonth,
        BarInterval::ThreeMonths,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BarInterval::OneMinute => "1m",
            BarInterval::TwoMinutes => "2m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::SixtyMinutes => "60m",
            BarInterval::NinetyMinutes => "90m",
            BarInterval::OneHour => "1h",
            BarInterval::OneDay => "1d",
            BarInterval::FiveDays => "5d",
            BarInterval::OneWeek => "1wk",
            BarInterval::OneMonth => "1mo",
            BarInterval::ThreeMonths => "3mo",
        }
    }

    /// Nominal spacing between bars (months count as 30 days).
    pub fn duration(self) -> Duration {
        match self {
            BarInterval::OneMinute => Duration::minutes(1),
            BarInterval::TwoMinutes => Duration::minutes(2),
            BarInterval::FiveMinutes => Duration::minutes(5),
            BarInterval::FifteenMinutes => Duration::minutes(15),
            BarInterval::ThirtyMinutes => Duration::minutes(30),
            BarInterval::SixtyMinutes | BarInterval::OneHour => Duration::hours(1),
            BarInterval::NinetyMinutes => Duration::minutes(90),
            BarInterval::OneDay => Duration::days(1),
            BarInterval::FiveDays => Duration::days(5),
            BarInterval::OneWeek => Duration::weeks(1),
            BarInterval::OneMonth => Duration::days(30),
            BarInterval::ThreeMonths => Duration::days(90),
        }
    }
}

impl Default for BarInterval {
    fn default() -> Self {
        BarInterval::OneHour
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarInterval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BarInterval::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataError::InvalidParameter {
                kind: "interval",
                value: s.to_string(),
            })
    }
}

/// Trait for bar providers (Yahoo Finance, CSV import, synthetic).
///
/// Implementations return bars sorted ascending with unique timestamps.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch OHLCV bars for `symbol` covering `period` at `interval` spacing.
    fn fetch_history(
        &self,
        symbol: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> Result<FetchResult, DataError>;

    /// Whether the provider currently accepts requests.
    fn is_available(&self) -> bool {
        true
    }
}

/// Fetch history, converting any failure into an empty series.
///
/// Errors are logged and never propagated; an empty result is valid input
/// for the rest of the pipeline.
pub fn fetch_history_or_empty(
    provider: &dyn DataProvider,
    symbol: &str,
    period: HistoryPeriod,
    interval: BarInterval,
) -> Vec<Bar> {
    match provider.fetch_history(symbol, period, interval) {
        Ok(result) => sort_and_dedup(result.bars),
        Err(e) => {
            warn!(provider = provider.name(), symbol, error = %e, "history fetch failed");
            Vec::new()
        }
    }
}

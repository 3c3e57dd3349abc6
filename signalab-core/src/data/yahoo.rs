//! Yahoo Finance provider.
//!
//! Fetches OHLCV bars from the v8 chart API using the `range`/`interval`
//! query form. Retries with exponential backoff and reports to a shared
//! circuit breaker. Yahoo has no official API; the CSV provider is the
//! offline fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BarInterval, DataError, DataProvider, DataSource, FetchResult, HistoryPeriod};
use crate::domain::{sort_and_dedup, Bar};

/// `{"chart": {"result": [...], "error": {...}}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<Series>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(rename = "timestamp")]
    timestamps: Option<Vec<i64>>,
    indicators: SeriesIndicators,
}

#[derive(Debug, Deserialize)]
struct SeriesIndicators {
    quote: Vec<Quotes>,
}

/// Parallel columns; `null` marks a slot without trading.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quotes {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

impl Quotes {
    fn bar(&self, i: usize, timestamp: DateTime<Utc>) -> Option<Bar> {
        let at = |column: &[Option<f64>]| column.get(i).copied().flatten();
        Some(Bar {
            timestamp,
            open: at(&self.open)?,
            high: at(&self.high)?,
            low: at(&self.low)?,
            close: at(&self.close)?,
            volume: self.volume.get(i).copied().flatten().unwrap_or(0),
        })
    }
}

fn format_changed(what: &str) -> DataError {
    DataError::ResponseFormatChanged(what.to_string())
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) signalab")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            base_url: "https://query2.finance.yahoo.com/v8/finance/chart".to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Point the provider at a different chart endpoint (mirrors, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn chart_url(&self, symbol: &str, period: HistoryPeriod, interval: BarInterval) -> String {
        format!(
            "{}/{symbol}?range={period}&interval={interval}&includePrePost=false",
            self.base_url.trim_end_matches('/')
        )
    }

    fn parse_response(symbol: &str, envelope: Envelope) -> Result<Vec<Bar>, DataError> {
        let Chart { result, error } = envelope.chart;
        let series = match (result, error) {
            (Some(series), _) => series,
            (None, Some(e)) if e.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            (None, Some(e)) => {
                return Err(format_changed(&format!("{}: {}", e.code, e.description)))
            }
            (None, None) => return Err(format_changed("chart carried neither result nor error")),
        };

        let Some(Series { timestamps, indicators }) = series.into_iter().next() else {
            return Err(format_changed("chart result is empty"));
        };
        let timestamps = timestamps.ok_or_else(|| format_changed("series has no timestamps"))?;
        let quotes = indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| format_changed("series has no quote block"))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &secs) in timestamps.iter().enumerate() {
            let timestamp = DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| format_changed(&format!("timestamp {secs} out of range")))?;
            if let Some(bar) = quotes.bar(i, timestamp) {
                bars.push(bar);
            }
        }

        let skipped = timestamps.len() - bars.len();
        if skipped > 0 {
            debug!(symbol, skipped, "dropped incomplete bars");
        }
        if bars.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(sort_and_dedup(bars))
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, DataError> {
        let url = self.chart_url(symbol, period, interval);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(DataError::RateLimited { retry_after_secs });
                continue;
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let envelope: Envelope = resp
                .json()
                .map_err(|e| format_changed(&format!("undecodable chart for {symbol}: {e}")))?;
            let bars = Self::parse_response(symbol, envelope)?;
            self.circuit_breaker.record_success();
            return Ok(bars);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_history(
        &self,
        symbol: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> Result<FetchResult, DataError> {
        let bars = self.fetch_with_retry(symbol, period, interval)?;
        info!(symbol, %period, %interval, bars = bars.len(), "fetched history");
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

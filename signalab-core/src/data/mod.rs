//! Data source adapters: historical bar providers, the live tick stream and
//! the sentiment placeholder.

pub mod circuit_breaker;
pub mod csv_import;
pub mod provider;
pub mod sentiment;
pub mod stream;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_import::{read_bars_csv, write_bars_csv, CsvProvider};
pub use provider::{
    fetch_history_or_empty, BarInterval, DataError, DataProvider, DataSource, FetchResult,
    HistoryPeriod,
};
pub use sentiment::{Article, SentimentCollector};
pub use stream::{
    MessageSource, SubscriberRegistry, SubscriptionId, Tick, TickBuffer, TickStream,
    WebSocketSource,
};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;

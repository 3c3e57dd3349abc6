//! News sentiment placeholder.
//!
//! No news source is wired in; `news_sentiment` reports neutral. Scores are
//! in [-1, 1].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub sentiment: f64,
}

#[derive(Debug, Clone)]
pub struct SentimentCollector {
    pub symbol: String,
}

impl SentimentCollector {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    /// Always 0.0 (neutral).
    pub fn news_sentiment(&self) -> f64 {
        0.0
    }

    /// Mean article sentiment; 0.0 for no articles.
    pub fn score_articles(&self, articles: &[Article]) -> f64 {
        if articles.is_empty() {
            return 0.0;
        }
        articles.iter().map(|a| a.sentiment).sum::<f64>() / articles.len() as f64
    }
}

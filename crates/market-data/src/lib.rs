use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A point-in-time market snapshot for one ticker.
///
/// Best effort: providers may return stale data or none at all. The core
/// never assumes freshness beyond `as_of`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub previous_close: f64,
    pub day_change: f64,
    pub day_change_percent: f64,
    pub volume: i64,
    pub market_cap: Option<i64>,
    pub sector: Option<String>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub as_of: DateTime<Utc>,
}

impl Quote {
    /// Build a quote from the two prices every provider has, deriving the
    /// day-change fields. Remaining fields default to unknown.
    pub fn new(ticker: impl Into<String>, price: f64, previous_close: f64) -> Self {
        let day_change = price - previous_close;
        let day_change_percent = if previous_close != 0.0 {
            day_change / previous_close * 100.0
        } else {
            0.0
        };

        Self {
            ticker: ticker.into(),
            price,
            previous_close,
            day_change,
            day_change_percent,
            volume: 0,
            market_cap: None,
            sector: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            pe_ratio: None,
            as_of: Utc::now(),
        }
    }
}

/// Errors from quote providers.
///
/// `Unavailable` is a soft miss: callers degrade to cached data rather than
/// propagating it.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("no quote available for {0}")]
    Unavailable(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Source of current prices for the portfolio core.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> Result<Quote, QuoteError>;
}

/// In-memory provider backed by a ticker -> quote map.
///
/// Used by tests and demos; tickers without an entry report `Unavailable`,
/// which exercises the same fallback path a real provider miss would.
#[derive(Default)]
pub struct MemoryQuoteProvider {
    quotes: RwLock<HashMap<String, Quote>>,
}

impl MemoryQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, quote: Quote) {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.ticker.to_uppercase(), quote);
    }

    pub async fn clear(&self, ticker: &str) {
        let mut quotes = self.quotes.write().await;
        quotes.remove(&ticker.to_uppercase());
    }
}

#[async_trait]
impl QuoteProvider for MemoryQuoteProvider {
    async fn get_quote(&self, ticker: &str) -> Result<Quote, QuoteError> {
        let quotes = self.quotes.read().await;
        quotes
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| QuoteError::Unavailable(ticker.to_uppercase()))
    }
}

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

/// Shared reference data for one listed stock. The cached price is an
/// explicit cache entry: `last_price` plus its `price_updated_at` staleness
/// timestamp, written last-write-wins by the catalog only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stock {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: Option<i64>,
    pub volume: i64,
    pub last_price: f64,
    pub price_updated_at: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_updated: String,
}

/// Input for creating or updating a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStock {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: Option<i64>,
    pub volume: i64,
    pub last_price: f64,
}

impl NewStock {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, last_price: f64) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            sector: String::new(),
            industry: String::new(),
            market_cap: None,
            volume: 0,
            last_price,
        }
    }
}

/// A user's aggregated holding of one ticker: quantity plus weighted-average
/// cost basis. Deleted once quantity reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// One immutable entry in the append-only trade log.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockTransaction {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub stock_name: String,
    pub quantity: i64,
    pub price: f64,
    pub side: TradeSide,
    pub executed_at: String,
}

impl StockTransaction {
    pub fn total_value(&self) -> Decimal {
        Decimal::from(self.quantity) * Decimal::from_f64(self.price).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WatchlistEntry {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub stock_name: String,
    pub added_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertDirection {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    Active,
    Triggered,
    Cancelled,
}

/// A price alert. Status moves ACTIVE -> TRIGGERED exactly once (the
/// evaluator latch); cancellation and deletion are user actions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceAlert {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub stock_name: String,
    pub direction: AlertDirection,
    pub target_price: f64,
    pub status: AlertStatus,
    pub created_at: String,
    pub triggered_at: Option<String>,
}

/// A saved side-by-side comparison, tickers stored comma-separated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comparison {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub tickers: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Comparison {
    pub fn ticker_list(&self) -> Vec<String> {
        self.tickers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

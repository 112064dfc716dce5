use thiserror::Error;

/// Domain errors for the portfolio core.
///
/// Validation and holding errors abort the operation with no partial state
/// change. Quote-provider misses never appear here; they degrade to cached
/// prices at the call site.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("quantity {requested} exceeds the per-trade limit of {max}")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("cannot sell {requested} shares of {ticker}, only {owned} owned")]
    InsufficientHolding {
        ticker: String,
        owned: i64,
        requested: i64,
    },

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("price must be positive")]
    InvalidPrice,

    #[error("invalid comparison: {0}")]
    InvalidComparison(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

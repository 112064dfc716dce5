pub mod alerts;
pub mod comparisons;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod stocks;
pub mod trades;
pub mod users;
pub mod valuation;
pub mod watchlist;

pub use alerts::{should_trigger, AlertQuote, AlertService};
pub use comparisons::ComparisonStore;
pub use db::PortfolioDb;
pub use error::PortfolioError;
pub use ledger::{PositionLedger, ReconcileMismatch, ReplayedPosition};
pub use models::*;
pub use stocks::{normalize_ticker, StockCatalog};
pub use trades::{PriceSource, TradeExecutor, TradeReceipt, MAX_TRADE_QUANTITY};
pub use users::UserStore;
pub use valuation::{
    summarize, value_position, PortfolioSummary, PositionValuation, Valuation, ValuationService,
};
pub use watchlist::WatchlistStore;

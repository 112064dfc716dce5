use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::ledger::PositionLedger;
use crate::models::{StockTransaction, TradeSide};
use crate::stocks::StockCatalog;
use crate::users::UserStore;
use market_data::QuoteProvider;
use notifier::{Notification, NotifierService};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Single-operation cap on buy quantity.
pub const MAX_TRADE_QUANTITY: i64 = 10_000;

/// Where the executed price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Cached,
}

/// The outcome of one executed trade. `total_value` is informational; there
/// is no cash balance in this simulated ledger.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub transaction: StockTransaction,
    pub price: f64,
    pub total_value: Decimal,
    pub price_source: PriceSource,
}

/// Orchestrates one buy or sell end-to-end: price resolution, ledger write,
/// and the detached confirmation notification.
pub struct TradeExecutor {
    catalog: StockCatalog,
    ledger: PositionLedger,
    users: UserStore,
    quotes: Arc<dyn QuoteProvider>,
    notifier: NotifierService,
}

impl TradeExecutor {
    pub fn new(db: PortfolioDb, quotes: Arc<dyn QuoteProvider>, notifier: NotifierService) -> Self {
        Self {
            catalog: StockCatalog::new(db.clone()),
            ledger: PositionLedger::new(db.clone()),
            users: UserStore::new(db),
            quotes,
            notifier,
        }
    }

    /// Buy at the freshest available price. A live quote also refreshes the
    /// stock's cached price entry; a provider miss falls back to the cache.
    pub async fn buy(
        &self,
        user_id: i64,
        ticker: &str,
        quantity: i64,
    ) -> Result<TradeReceipt, PortfolioError> {
        if quantity <= 0 {
            return Err(PortfolioError::InvalidQuantity(quantity));
        }
        if quantity > MAX_TRADE_QUANTITY {
            return Err(PortfolioError::QuantityTooLarge {
                requested: quantity,
                max: MAX_TRADE_QUANTITY,
            });
        }

        let stock = self.catalog.require(ticker).await?;
        let (price, price_source) = match self.quotes.get_quote(&stock.ticker).await {
            Ok(quote) => {
                self.catalog.refresh_from_quote(&quote).await?;
                (quote.price, PriceSource::Live)
            }
            Err(e) => {
                tracing::warn!(
                    ticker = %stock.ticker,
                    "quote unavailable, using cached price: {}",
                    e
                );
                (stock.last_price, PriceSource::Cached)
            }
        };

        let transaction = self
            .ledger
            .apply(user_id, &stock.ticker, TradeSide::Buy, quantity, price, &stock.name)
            .await?;
        let total_value = transaction.total_value();

        tracing::info!(user_id, ticker = %stock.ticker, quantity, price, "buy executed");
        self.notify(
            user_id,
            "Stock Purchase Confirmation",
            format!(
                "You successfully purchased {} shares of {} at ${:.2} per share. Total: ${:.2}",
                quantity, stock.name, price, total_value
            ),
        )
        .await;

        Ok(TradeReceipt {
            transaction,
            price,
            total_value,
            price_source,
        })
    }

    /// Sell at the stock's cached price. The ledger enforces holdings; the
    /// position's basis is left unchanged.
    pub async fn sell(
        &self,
        user_id: i64,
        ticker: &str,
        quantity: i64,
    ) -> Result<TradeReceipt, PortfolioError> {
        if quantity <= 0 {
            return Err(PortfolioError::InvalidQuantity(quantity));
        }

        let stock = self.catalog.require(ticker).await?;
        let price = stock.last_price;

        let transaction = self
            .ledger
            .apply(user_id, &stock.ticker, TradeSide::Sell, quantity, price, &stock.name)
            .await?;
        let total_value = transaction.total_value();

        tracing::info!(user_id, ticker = %stock.ticker, quantity, price, "sell executed");
        self.notify(
            user_id,
            "Stock Sale Confirmation",
            format!(
                "You successfully sold {} shares of {} at ${:.2} per share. Total: ${:.2}",
                quantity, stock.name, price, total_value
            ),
        )
        .await;

        Ok(TradeReceipt {
            transaction,
            price,
            total_value,
            price_source: PriceSource::Cached,
        })
    }

    /// Fire-and-forget confirmation. Lookup or delivery problems are logged
    /// and never fail the trade.
    async fn notify(&self, user_id: i64, subject: &str, body: String) {
        match self.users.get(user_id).await {
            Ok(Some(user)) => {
                self.notifier
                    .dispatch(Notification::new(user.email, subject, body));
            }
            Ok(None) => {
                tracing::debug!(user_id, "no user row for trade notification");
            }
            Err(e) => {
                tracing::warn!(user_id, "failed to resolve notification recipient: {}", e);
            }
        }
    }
}

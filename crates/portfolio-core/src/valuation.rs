use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::ledger::PositionLedger;
use crate::stocks::StockCatalog;
use crate::trades::PriceSource;
use market_data::QuoteProvider;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Gain/loss figures for a holding or a whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub current_value: Decimal,
    pub invested_value: Decimal,
    pub gain_loss: Decimal,
    pub gain_loss_percent: f64,
}

/// Value one position at a current price. Pure; a zero invested value yields
/// a zero percentage rather than a division error.
pub fn value_position(quantity: i64, avg_price: Decimal, current_price: Decimal) -> Valuation {
    let current_value = Decimal::from(quantity) * current_price;
    let invested_value = Decimal::from(quantity) * avg_price;
    let gain_loss = current_value - invested_value;
    let gain_loss_percent = if invested_value > Decimal::ZERO {
        ((gain_loss / invested_value) * Decimal::from(100))
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    Valuation {
        current_value,
        invested_value,
        gain_loss,
        gain_loss_percent,
    }
}

/// Sum valuations field-wise; the overall percentage follows the same
/// zero-invested rule.
pub fn summarize<'a, I>(valuations: I) -> Valuation
where
    I: IntoIterator<Item = &'a Valuation>,
{
    let mut current_value = Decimal::ZERO;
    let mut invested_value = Decimal::ZERO;
    for v in valuations {
        current_value += v.current_value;
        invested_value += v.invested_value;
    }

    let gain_loss = current_value - invested_value;
    let gain_loss_percent = if invested_value > Decimal::ZERO {
        ((gain_loss / invested_value) * Decimal::from(100))
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    Valuation {
        current_value,
        invested_value,
        gain_loss,
        gain_loss_percent,
    }
}

/// One position valued at its resolved price.
#[derive(Debug, Clone, Serialize)]
pub struct PositionValuation {
    pub ticker: String,
    pub stock_name: String,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub price_source: PriceSource,
    #[serde(flatten)]
    pub valuation: Valuation,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_positions: usize,
    #[serde(flatten)]
    pub totals: Valuation,
    pub positions: Vec<PositionValuation>,
}

/// Values a user's holdings with live quotes where available, the cached
/// stock price otherwise. Never fails on a quote miss.
pub struct ValuationService {
    catalog: StockCatalog,
    ledger: PositionLedger,
    quotes: Arc<dyn QuoteProvider>,
}

impl ValuationService {
    pub fn new(db: PortfolioDb, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self {
            catalog: StockCatalog::new(db.clone()),
            ledger: PositionLedger::new(db),
            quotes,
        }
    }

    pub async fn portfolio(&self, user_id: i64) -> Result<PortfolioSummary, PortfolioError> {
        let positions = self.ledger.positions(user_id).await?;
        let mut valued = Vec::with_capacity(positions.len());

        for position in positions {
            let stock = self.catalog.get(&position.ticker).await?;
            let stock_name = stock
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| position.ticker.clone());

            let (price, price_source) = match self.quotes.get_quote(&position.ticker).await {
                Ok(quote) => {
                    self.catalog.refresh_from_quote(&quote).await?;
                    (quote.price, PriceSource::Live)
                }
                // Degrade to the cached price, or zero when the catalog has
                // no row either.
                Err(_) => (
                    stock.as_ref().map(|s| s.last_price).unwrap_or(0.0),
                    PriceSource::Cached,
                ),
            };

            let avg_price = Decimal::from_f64(position.avg_price).unwrap_or_default();
            let current_price = Decimal::from_f64(price).unwrap_or_default();
            let valuation = value_position(position.quantity, avg_price, current_price);

            valued.push(PositionValuation {
                ticker: position.ticker,
                stock_name,
                quantity: position.quantity,
                avg_price,
                current_price,
                price_source,
                valuation,
            });
        }

        let totals = summarize(valued.iter().map(|p| &p.valuation));

        Ok(PortfolioSummary {
            total_positions: valued.len(),
            totals,
            positions: valued,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewStock;
    use crate::models::TradeSide;
    use crate::users::UserStore;
    use market_data::{MemoryQuoteProvider, Quote};
    use rust_decimal_macros::dec;

    #[test]
    fn test_value_position_example() {
        let v = value_position(15, dec!(60), dec!(90));
        assert_eq!(v.current_value, dec!(1350));
        assert_eq!(v.invested_value, dec!(900));
        assert_eq!(v.gain_loss, dec!(450));
        assert_eq!(v.gain_loss_percent, 50.0);
    }

    #[test]
    fn test_value_position_loss() {
        let v = value_position(10, dec!(100), dec!(75));
        assert_eq!(v.gain_loss, dec!(-250));
        assert_eq!(v.gain_loss_percent, -25.0);
    }

    #[test]
    fn test_zero_invested_value_yields_zero_percent() {
        let v = value_position(0, dec!(60), dec!(90));
        assert_eq!(v.invested_value, Decimal::ZERO);
        assert_eq!(v.gain_loss_percent, 0.0);

        // Any current value, same rule.
        let v = value_position(5, dec!(0), dec!(123.45));
        assert_eq!(v.gain_loss_percent, 0.0);
    }

    #[test]
    fn test_summarize_sums_fields() {
        let a = value_position(15, dec!(60), dec!(90));
        let b = value_position(10, dec!(100), dec!(75));
        let totals = summarize([&a, &b]);

        assert_eq!(totals.current_value, dec!(2100));
        assert_eq!(totals.invested_value, dec!(1900));
        assert_eq!(totals.gain_loss, dec!(200));

        let empty = summarize(std::iter::empty::<&Valuation>());
        assert_eq!(empty.gain_loss_percent, 0.0);
    }

    #[tokio::test]
    async fn test_portfolio_mixes_live_and_cached_prices() {
        let db = PortfolioDb::new("sqlite::memory:").await.unwrap();
        let provider = Arc::new(MemoryQuoteProvider::new());
        let catalog = StockCatalog::new(db.clone());
        let ledger = PositionLedger::new(db.clone());
        let user_id = UserStore::new(db.clone())
            .create("alice", "alice@example.com")
            .await
            .unwrap()
            .id;

        catalog
            .upsert(NewStock::new("XYZ", "Xyz Corp", 60.0))
            .await
            .unwrap();
        catalog
            .upsert(NewStock::new("ABC", "Abc Corp", 20.0))
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 15, 60.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "ABC", TradeSide::Buy, 10, 20.0, "Abc Corp")
            .await
            .unwrap();

        // Live quote only for XYZ; ABC degrades to its cached price.
        provider.set(Quote::new("XYZ", 90.0, 60.0)).await;

        let service = ValuationService::new(db, provider);
        let summary = service.portfolio(user_id).await.unwrap();

        assert_eq!(summary.total_positions, 2);
        let xyz = summary
            .positions
            .iter()
            .find(|p| p.ticker == "XYZ")
            .unwrap();
        assert_eq!(xyz.price_source, PriceSource::Live);
        assert_eq!(xyz.valuation.current_value, dec!(1350));
        assert_eq!(xyz.valuation.gain_loss_percent, 50.0);

        let abc = summary
            .positions
            .iter()
            .find(|p| p.ticker == "ABC")
            .unwrap();
        assert_eq!(abc.price_source, PriceSource::Cached);
        assert_eq!(abc.valuation.gain_loss, Decimal::ZERO);

        assert_eq!(summary.totals.current_value, dec!(1550));
        assert_eq!(summary.totals.invested_value, dec!(1100));
    }
}

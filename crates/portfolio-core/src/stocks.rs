use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::{NewStock, Stock};
use chrono::Utc;
use market_data::Quote;

const MAX_TICKER_LEN: usize = 10;

/// Uppercase and validate a ticker symbol.
pub fn normalize_ticker(ticker: &str) -> Result<String, PortfolioError> {
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
        return Err(PortfolioError::InvalidTicker(ticker));
    }
    Ok(ticker)
}

/// The shared stock catalog: reference data plus the cached-price entry.
pub struct StockCatalog {
    db: PortfolioDb,
}

impl StockCatalog {
    pub fn new(db: PortfolioDb) -> Self {
        Self { db }
    }

    /// Insert or update a catalog entry, keyed by ticker.
    pub async fn upsert(&self, stock: NewStock) -> Result<Stock, PortfolioError> {
        let ticker = normalize_ticker(&stock.ticker)?;
        if stock.last_price <= 0.0 {
            return Err(PortfolioError::InvalidPrice);
        }
        let now = Utc::now().to_rfc3339();

        let stock = sqlx::query_as::<_, Stock>(
            r#"
            INSERT INTO stocks (ticker, name, sector, industry, market_cap, volume, last_price, price_updated_at, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                name = excluded.name,
                sector = excluded.sector,
                industry = excluded.industry,
                market_cap = excluded.market_cap,
                volume = excluded.volume,
                last_price = excluded.last_price,
                price_updated_at = excluded.price_updated_at,
                last_updated = excluded.last_updated
            RETURNING *
            "#,
        )
        .bind(&ticker)
        .bind(&stock.name)
        .bind(&stock.sector)
        .bind(&stock.industry)
        .bind(stock.market_cap)
        .bind(stock.volume)
        .bind(stock.last_price)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(self.db.pool())
        .await?;

        Ok(stock)
    }

    pub async fn get(&self, ticker: &str) -> Result<Option<Stock>, PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        let stock = sqlx::query_as::<_, Stock>("SELECT * FROM stocks WHERE ticker = ?")
            .bind(&ticker)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(stock)
    }

    /// Like `get`, but an absent row is an `UnknownTicker` error.
    pub async fn require(&self, ticker: &str) -> Result<Stock, PortfolioError> {
        let normalized = normalize_ticker(ticker)?;
        self.get(&normalized)
            .await?
            .ok_or(PortfolioError::UnknownTicker(normalized))
    }

    /// Case-insensitive search over ticker and name.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Stock>, PortfolioError> {
        let pattern = format!("%{}%", query.trim());
        let stocks = sqlx::query_as::<_, Stock>(
            "SELECT * FROM stocks WHERE ticker LIKE ? OR name LIKE ? ORDER BY ticker LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(stocks)
    }

    /// Actively traded stocks, most traded first.
    pub async fn list_active(&self, limit: i64) -> Result<Vec<Stock>, PortfolioError> {
        let stocks = sqlx::query_as::<_, Stock>(
            "SELECT * FROM stocks WHERE is_active = 1 ORDER BY volume DESC, ticker LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(stocks)
    }

    /// Last-write-wins refresh of the cached price entry from a live quote.
    /// The only writer of `last_price` / `price_updated_at` after creation.
    /// A quote for a ticker not in the catalog is a no-op.
    pub async fn refresh_from_quote(&self, quote: &Quote) -> Result<Option<Stock>, PortfolioError> {
        let ticker = normalize_ticker(&quote.ticker)?;
        let now = Utc::now().to_rfc3339();

        let stock = sqlx::query_as::<_, Stock>(
            r#"
            UPDATE stocks
            SET last_price = ?,
                price_updated_at = ?,
                volume = CASE WHEN ? > 0 THEN ? ELSE volume END,
                market_cap = COALESCE(?, market_cap),
                last_updated = ?
            WHERE ticker = ?
            RETURNING *
            "#,
        )
        .bind(quote.price)
        .bind(&now)
        .bind(quote.volume)
        .bind(quote.volume)
        .bind(quote.market_cap)
        .bind(&now)
        .bind(&ticker)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(stock)
    }

    pub async fn deactivate(&self, ticker: &str) -> Result<(), PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        let result = sqlx::query("UPDATE stocks SET is_active = 0, last_updated = ? WHERE ticker = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&ticker)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortfolioError::UnknownTicker(ticker));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> PortfolioDb {
        PortfolioDb::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_require() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        let stock = catalog
            .upsert(NewStock::new("aapl", "Apple Inc.", 150.0))
            .await
            .unwrap();
        assert_eq!(stock.ticker, "AAPL");
        assert_eq!(stock.last_price, 150.0);

        let fetched = catalog.require("AAPL").await.unwrap();
        assert_eq!(fetched.name, "Apple Inc.");

        let missing = catalog.require("MSFT").await;
        assert!(matches!(missing, Err(PortfolioError::UnknownTicker(t)) if t == "MSFT"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_input() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        let too_long = catalog
            .upsert(NewStock::new("TOOLONGTICKER", "Bad", 10.0))
            .await;
        assert!(matches!(too_long, Err(PortfolioError::InvalidTicker(_))));

        let free = catalog.upsert(NewStock::new("FREE", "Free Corp", 0.0)).await;
        assert!(matches!(free, Err(PortfolioError::InvalidPrice)));
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_row() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        catalog
            .upsert(NewStock::new("AAPL", "Apple Inc.", 150.0))
            .await
            .unwrap();
        let updated = catalog
            .upsert(NewStock::new("AAPL", "Apple Inc.", 155.0))
            .await
            .unwrap();
        assert_eq!(updated.last_price, 155.0);

        let all = catalog.search("AAPL", 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_from_quote_updates_cache_entry() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        let before = catalog
            .upsert(NewStock::new("AAPL", "Apple Inc.", 150.0))
            .await
            .unwrap();

        let mut quote = Quote::new("AAPL", 162.5, 150.0);
        quote.volume = 1_000_000;
        let after = catalog.refresh_from_quote(&quote).await.unwrap().unwrap();

        assert_eq!(after.last_price, 162.5);
        assert_eq!(after.volume, 1_000_000);
        assert!(after.price_updated_at >= before.price_updated_at);

        // Unknown ticker refresh is a no-op, not an error.
        let missing = catalog
            .refresh_from_quote(&Quote::new("MSFT", 400.0, 399.0))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_search_matches_ticker_and_name() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        catalog
            .upsert(NewStock::new("AAPL", "Apple Inc.", 150.0))
            .await
            .unwrap();
        catalog
            .upsert(NewStock::new("MSFT", "Microsoft Corporation", 400.0))
            .await
            .unwrap();

        let by_ticker = catalog.search("MS", 10).await.unwrap();
        assert_eq!(by_ticker.len(), 1);
        assert_eq!(by_ticker[0].ticker, "MSFT");

        let by_name = catalog.search("apple", 10).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_deactivate_removes_from_active_list() {
        let db = setup_test_db().await;
        let catalog = StockCatalog::new(db);

        catalog
            .upsert(NewStock::new("AAPL", "Apple Inc.", 150.0))
            .await
            .unwrap();
        catalog.deactivate("AAPL").await.unwrap();

        let active = catalog.list_active(10).await.unwrap();
        assert!(active.is_empty());
    }
}

use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::WatchlistEntry;
use crate::stocks::{normalize_ticker, StockCatalog};
use chrono::Utc;

/// Set membership of (user, ticker). Add and remove are idempotent.
pub struct WatchlistStore {
    db: PortfolioDb,
    catalog: StockCatalog,
}

impl WatchlistStore {
    pub fn new(db: PortfolioDb) -> Self {
        Self {
            catalog: StockCatalog::new(db.clone()),
            db,
        }
    }

    /// Add a ticker; adding one already present is a no-op success.
    pub async fn add(&self, user_id: i64, ticker: &str) -> Result<(), PortfolioError> {
        let stock = self.catalog.require(ticker).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO watchlist (user_id, ticker, stock_name, added_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&stock.ticker)
        .bind(&stock.name)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Remove a ticker; removing an absent one is a no-op success.
    pub async fn remove(&self, user_id: i64, ticker: &str) -> Result<(), PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        sqlx::query("DELETE FROM watchlist WHERE user_id = ? AND ticker = ?")
            .bind(user_id)
            .bind(&ticker)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<WatchlistEntry>, PortfolioError> {
        let entries = sqlx::query_as::<_, WatchlistEntry>(
            "SELECT * FROM watchlist WHERE user_id = ? ORDER BY added_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(entries)
    }

    pub async fn contains(&self, user_id: i64, ticker: &str) -> Result<bool, PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM watchlist WHERE user_id = ? AND ticker = ?",
        )
        .bind(user_id)
        .bind(&ticker)
        .fetch_one(self.db.pool())
        .await?;

        Ok(count > 0)
    }
}

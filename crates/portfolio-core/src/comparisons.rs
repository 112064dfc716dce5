use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::Comparison;
use chrono::Utc;

/// Saved side-by-side stock comparisons. Pure storage; tickers are kept as
/// delimited text and parsed on the way out.
pub struct ComparisonStore {
    db: PortfolioDb,
}

impl ComparisonStore {
    pub fn new(db: PortfolioDb) -> Self {
        Self { db }
    }

    pub async fn save(
        &self,
        user_id: i64,
        name: &str,
        tickers: &[String],
    ) -> Result<Comparison, PortfolioError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortfolioError::InvalidComparison("name must not be empty"));
        }

        let normalized: Vec<String> = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        if normalized.is_empty() {
            return Err(PortfolioError::InvalidComparison(
                "at least one ticker is required",
            ));
        }

        let now = Utc::now().to_rfc3339();
        let comparison = sqlx::query_as::<_, Comparison>(
            r#"
            INSERT INTO comparisons (user_id, name, tickers, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(normalized.join(","))
        .bind(&now)
        .bind(&now)
        .fetch_one(self.db.pool())
        .await?;

        Ok(comparison)
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<Comparison>, PortfolioError> {
        let comparisons = sqlx::query_as::<_, Comparison>(
            "SELECT * FROM comparisons WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(comparisons)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Comparison, PortfolioError> {
        let comparison = sqlx::query_as::<_, Comparison>(
            "SELECT * FROM comparisons WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        comparison.ok_or(PortfolioError::NotFound("comparison"))
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), PortfolioError> {
        let result = sqlx::query("DELETE FROM comparisons WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortfolioError::NotFound("comparison"));
        }
        Ok(())
    }
}

use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::{Position, StockTransaction, TradeSide};
use crate::stocks::normalize_ticker;
use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Owns the append-only transaction log and the materialized position
/// aggregate. The aggregate is authoritative; `replay` exists for audit and
/// reconciliation only.
pub struct PositionLedger {
    db: PortfolioDb,
}

/// A position reconstructed from the transaction log alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayedPosition {
    pub ticker: String,
    pub quantity: i64,
    /// Net cash into the ticker: buy value minus sell value at trade prices.
    pub net_invested: f64,
}

/// A disagreement between the log and the materialized aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileMismatch {
    pub ticker: String,
    pub replayed_quantity: i64,
    pub position_quantity: i64,
}

impl PositionLedger {
    pub fn new(db: PortfolioDb) -> Self {
        Self { db }
    }

    /// Apply one trade: append a transaction and mutate the position
    /// aggregate in a single database transaction. Either both writes land
    /// or neither does.
    pub async fn apply(
        &self,
        user_id: i64,
        ticker: &str,
        side: TradeSide,
        quantity: i64,
        price: f64,
        stock_name: &str,
    ) -> Result<StockTransaction, PortfolioError> {
        if quantity <= 0 {
            return Err(PortfolioError::InvalidQuantity(quantity));
        }
        if price <= 0.0 {
            return Err(PortfolioError::InvalidPrice);
        }
        let ticker = normalize_ticker(ticker)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.db.pool().begin().await?;

        let position =
            sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE user_id = ? AND ticker = ?")
                .bind(user_id)
                .bind(&ticker)
                .fetch_optional(&mut *tx)
                .await?;

        match side {
            TradeSide::Buy => match position {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO positions (user_id, ticker, quantity, avg_price, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(user_id)
                    .bind(&ticker)
                    .bind(quantity)
                    .bind(price)
                    .bind(&now)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(p) => {
                    let new_quantity = p.quantity + quantity;
                    let held = Decimal::from(p.quantity)
                        * Decimal::from_f64(p.avg_price).unwrap_or_default();
                    let added =
                        Decimal::from(quantity) * Decimal::from_f64(price).unwrap_or_default();
                    let new_avg = ((held + added) / Decimal::from(new_quantity))
                        .to_f64()
                        .unwrap_or(p.avg_price);

                    sqlx::query(
                        "UPDATE positions SET quantity = ?, avg_price = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(new_quantity)
                    .bind(new_avg)
                    .bind(&now)
                    .bind(p.id)
                    .execute(&mut *tx)
                    .await?;
                }
            },
            TradeSide::Sell => {
                let Some(p) = position else {
                    return Err(PortfolioError::InsufficientHolding {
                        ticker,
                        owned: 0,
                        requested: quantity,
                    });
                };
                if quantity > p.quantity {
                    return Err(PortfolioError::InsufficientHolding {
                        ticker,
                        owned: p.quantity,
                        requested: quantity,
                    });
                }

                let remaining = p.quantity - quantity;
                if remaining == 0 {
                    sqlx::query("DELETE FROM positions WHERE id = ?")
                        .bind(p.id)
                        .execute(&mut *tx)
                        .await?;
                } else {
                    // Basis is unchanged on a sell.
                    sqlx::query("UPDATE positions SET quantity = ?, updated_at = ? WHERE id = ?")
                        .bind(remaining)
                        .bind(&now)
                        .bind(p.id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        let transaction = sqlx::query_as::<_, StockTransaction>(
            r#"
            INSERT INTO transactions (user_id, ticker, stock_name, quantity, price, side, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&ticker)
        .bind(stock_name)
        .bind(quantity)
        .bind(price)
        .bind(side)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(transaction)
    }

    pub async fn position(
        &self,
        user_id: i64,
        ticker: &str,
    ) -> Result<Option<Position>, PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        let position =
            sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE user_id = ? AND ticker = ?")
                .bind(user_id)
                .bind(&ticker)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(position)
    }

    pub async fn positions(&self, user_id: i64) -> Result<Vec<Position>, PortfolioError> {
        let positions =
            sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE user_id = ? ORDER BY ticker")
                .bind(user_id)
                .fetch_all(self.db.pool())
                .await?;

        Ok(positions)
    }

    /// Transaction history, newest first.
    pub async fn transactions(
        &self,
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<StockTransaction>, PortfolioError> {
        let transactions = if let Some(limit) = limit {
            sqlx::query_as::<_, StockTransaction>(
                "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at DESC, id DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as::<_, StockTransaction>(
                "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at DESC, id DESC",
            )
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(transactions)
    }

    pub async fn transactions_for_ticker(
        &self,
        user_id: i64,
        ticker: &str,
    ) -> Result<Vec<StockTransaction>, PortfolioError> {
        let ticker = normalize_ticker(ticker)?;
        let transactions = sqlx::query_as::<_, StockTransaction>(
            "SELECT * FROM transactions WHERE user_id = ? AND ticker = ? ORDER BY executed_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(&ticker)
        .fetch_all(self.db.pool())
        .await?;

        Ok(transactions)
    }

    /// Rebuild holdings by folding the log oldest-first. Audit tool only;
    /// the positions table remains the source of truth.
    pub async fn replay(&self, user_id: i64) -> Result<Vec<ReplayedPosition>, PortfolioError> {
        let transactions = sqlx::query_as::<_, StockTransaction>(
            "SELECT * FROM transactions WHERE user_id = ? ORDER BY executed_at, id",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut replayed: BTreeMap<String, (i64, Decimal)> = BTreeMap::new();
        for txn in &transactions {
            let entry = replayed
                .entry(txn.ticker.clone())
                .or_insert((0, Decimal::ZERO));
            match txn.side {
                TradeSide::Buy => {
                    entry.0 += txn.quantity;
                    entry.1 += txn.total_value();
                }
                TradeSide::Sell => {
                    entry.0 -= txn.quantity;
                    entry.1 -= txn.total_value();
                }
            }
        }

        Ok(replayed
            .into_iter()
            .filter(|(_, (quantity, _))| *quantity > 0)
            .map(|(ticker, (quantity, net))| ReplayedPosition {
                ticker,
                quantity,
                net_invested: net.to_f64().unwrap_or(0.0),
            })
            .collect())
    }

    /// Compare replayed quantities against the materialized aggregate and
    /// report every ticker where the two derivations disagree.
    pub async fn reconcile(&self, user_id: i64) -> Result<Vec<ReconcileMismatch>, PortfolioError> {
        let replayed = self.replay(user_id).await?;
        let positions = self.positions(user_id).await?;

        let mut quantities: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for r in replayed {
            quantities.entry(r.ticker).or_default().0 = r.quantity;
        }
        for p in positions {
            quantities.entry(p.ticker).or_default().1 = p.quantity;
        }

        Ok(quantities
            .into_iter()
            .filter(|(_, (replayed, materialized))| replayed != materialized)
            .map(|(ticker, (replayed_quantity, position_quantity))| ReconcileMismatch {
                ticker,
                replayed_quantity,
                position_quantity,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserStore;

    async fn setup_test_db() -> PortfolioDb {
        PortfolioDb::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_user(db: &PortfolioDb) -> i64 {
        UserStore::new(db.clone())
            .create("alice", "alice@example.com")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_first_buy_creates_position() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        let txn = ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();
        assert_eq!(txn.side, TradeSide::Buy);
        assert_eq!(txn.quantity, 10);

        let position = ledger.position(user_id, "XYZ").await.unwrap().unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(position.avg_price, 50.0);
    }

    #[tokio::test]
    async fn test_weighted_average_basis() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 70.0, "Xyz Corp")
            .await
            .unwrap();

        let position = ledger.position(user_id, "XYZ").await.unwrap().unwrap();
        assert_eq!(position.quantity, 20);
        assert_eq!(position.avg_price, 60.0);
    }

    #[tokio::test]
    async fn test_basis_is_order_independent() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        // 5@40 + 15@80 in either order averages to 70.
        ledger
            .apply(user_id, "ABC", TradeSide::Buy, 15, 80.0, "Abc Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "ABC", TradeSide::Buy, 5, 40.0, "Abc Corp")
            .await
            .unwrap();

        let position = ledger.position(user_id, "ABC").await.unwrap().unwrap();
        assert_eq!(position.quantity, 20);
        assert_eq!(position.avg_price, 70.0);
    }

    #[tokio::test]
    async fn test_sell_decrements_quantity_and_keeps_basis() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 70.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Sell, 5, 65.0, "Xyz Corp")
            .await
            .unwrap();

        let position = ledger.position(user_id, "XYZ").await.unwrap().unwrap();
        assert_eq!(position.quantity, 15);
        assert_eq!(position.avg_price, 60.0);

        let log = ledger.transactions(user_id, None).await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].side, TradeSide::Sell);
    }

    #[tokio::test]
    async fn test_sell_to_zero_deletes_position() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Sell, 10, 55.0, "Xyz Corp")
            .await
            .unwrap();

        assert!(ledger.position(user_id, "XYZ").await.unwrap().is_none());
        assert_eq!(ledger.transactions(user_id, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversell_rejected_without_side_effects() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();

        let err = ledger
            .apply(user_id, "XYZ", TradeSide::Sell, 11, 55.0, "Xyz Corp")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortfolioError::InsufficientHolding {
                owned: 10,
                requested: 11,
                ..
            }
        ));

        // No partial sell, no log entry.
        let position = ledger.position(user_id, "XYZ").await.unwrap().unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(ledger.transactions(user_id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_without_position_rejected() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        let err = ledger
            .apply(user_id, "XYZ", TradeSide::Sell, 1, 55.0, "Xyz Corp")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortfolioError::InsufficientHolding { owned: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_nonpositive_quantity_rejected() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        for quantity in [0, -5] {
            let err = ledger
                .apply(user_id, "XYZ", TradeSide::Sell, quantity, 55.0, "Xyz Corp")
                .await
                .unwrap_err();
            assert!(matches!(err, PortfolioError::InvalidQuantity(q) if q == quantity));
        }

        assert!(ledger.transactions(user_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trades_do_not_touch_other_tickers() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "AAA", TradeSide::Buy, 10, 20.0, "Aaa Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "BBB", TradeSide::Buy, 4, 100.0, "Bbb Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "AAA", TradeSide::Sell, 3, 25.0, "Aaa Corp")
            .await
            .unwrap();

        let other = ledger.position(user_id, "BBB").await.unwrap().unwrap();
        assert_eq!(other.quantity, 4);
        assert_eq!(other.avg_price, 100.0);
    }

    #[tokio::test]
    async fn test_replay_and_reconcile_agree_with_positions() {
        let db = setup_test_db().await;
        let user_id = seed_user(&db).await;
        let ledger = PositionLedger::new(db);

        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 50.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Buy, 10, 70.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "XYZ", TradeSide::Sell, 5, 65.0, "Xyz Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "ABC", TradeSide::Buy, 2, 10.0, "Abc Corp")
            .await
            .unwrap();
        ledger
            .apply(user_id, "ABC", TradeSide::Sell, 2, 12.0, "Abc Corp")
            .await
            .unwrap();

        let replayed = ledger.replay(user_id).await.unwrap();
        // ABC went to zero and drops out of the replay.
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].ticker, "XYZ");
        assert_eq!(replayed[0].quantity, 15);

        assert!(ledger.reconcile(user_id).await.unwrap().is_empty());
    }
}

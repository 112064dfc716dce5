use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::{AlertDirection, AlertStatus, PriceAlert};
use crate::stocks::StockCatalog;
use crate::users::UserStore;
use chrono::Utc;
use market_data::QuoteProvider;
use notifier::{Notification, NotifierService};
use serde::Serialize;
use std::sync::Arc;

/// The transition rule. Boundaries are inclusive in both directions.
pub fn should_trigger(direction: AlertDirection, target_price: f64, current_price: f64) -> bool {
    match direction {
        AlertDirection::Above => current_price >= target_price,
        AlertDirection::Below => current_price <= target_price,
    }
}

/// An alert annotated with the price it was last evaluated against.
/// `current_price` is 0 when no quote was available.
#[derive(Debug, Clone, Serialize)]
pub struct AlertQuote {
    pub alert: PriceAlert,
    pub current_price: f64,
    pub difference: f64,
}

/// Price-alert store plus the ACTIVE -> TRIGGERED evaluator.
pub struct AlertService {
    db: PortfolioDb,
    catalog: StockCatalog,
    users: UserStore,
    quotes: Arc<dyn QuoteProvider>,
    notifier: NotifierService,
}

impl AlertService {
    pub fn new(db: PortfolioDb, quotes: Arc<dyn QuoteProvider>, notifier: NotifierService) -> Self {
        Self {
            catalog: StockCatalog::new(db.clone()),
            users: UserStore::new(db.clone()),
            db,
            quotes,
            notifier,
        }
    }

    pub async fn create(
        &self,
        user_id: i64,
        ticker: &str,
        direction: AlertDirection,
        target_price: f64,
    ) -> Result<PriceAlert, PortfolioError> {
        if target_price <= 0.0 {
            return Err(PortfolioError::InvalidPrice);
        }
        let stock = self.catalog.require(ticker).await?;

        let alert = sqlx::query_as::<_, PriceAlert>(
            r#"
            INSERT INTO price_alerts (user_id, ticker, stock_name, direction, target_price, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'ACTIVE', ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&stock.ticker)
        .bind(&stock.name)
        .bind(direction)
        .bind(target_price)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(self.db.pool())
        .await?;

        tracing::info!(user_id, ticker = %alert.ticker, target_price, "price alert created");
        Ok(alert)
    }

    /// User-initiated cancellation; valid from any state.
    pub async fn cancel(&self, user_id: i64, alert_id: i64) -> Result<(), PortfolioError> {
        let result =
            sqlx::query("UPDATE price_alerts SET status = 'CANCELLED' WHERE id = ? AND user_id = ?")
                .bind(alert_id)
                .bind(user_id)
                .execute(self.db.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(PortfolioError::NotFound("alert"));
        }
        Ok(())
    }

    pub async fn delete(&self, user_id: i64, alert_id: i64) -> Result<(), PortfolioError> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE id = ? AND user_id = ?")
            .bind(alert_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortfolioError::NotFound("alert"));
        }
        Ok(())
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<PriceAlert>, PortfolioError> {
        let alerts = sqlx::query_as::<_, PriceAlert>(
            "SELECT * FROM price_alerts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(alerts)
    }

    pub async fn active_count(&self, user_id: i64) -> Result<i64, PortfolioError> {
        self.count_by_status(user_id, AlertStatus::Active).await
    }

    pub async fn triggered_count(&self, user_id: i64) -> Result<i64, PortfolioError> {
        self.count_by_status(user_id, AlertStatus::Triggered).await
    }

    async fn count_by_status(
        &self,
        user_id: i64,
        status: AlertStatus,
    ) -> Result<i64, PortfolioError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM price_alerts WHERE user_id = ? AND status = ?",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(self.db.pool())
        .await?;

        Ok(count)
    }

    /// Evaluate all of a user's alerts against current quotes.
    ///
    /// ACTIVE alerts whose rule is satisfied latch to TRIGGERED and get a
    /// `triggered_at` stamp. TRIGGERED and CANCELLED alerts are never
    /// re-evaluated. A quote miss leaves the alert ACTIVE and reports a zero
    /// price; it never fails the evaluation.
    pub async fn evaluate(&self, user_id: i64) -> Result<Vec<AlertQuote>, PortfolioError> {
        let alerts = self.list(user_id).await?;
        let mut results = Vec::with_capacity(alerts.len());

        for mut alert in alerts {
            let quote_price = match self.quotes.get_quote(&alert.ticker).await {
                Ok(quote) => {
                    self.catalog.refresh_from_quote(&quote).await?;
                    Some(quote.price)
                }
                Err(_) => None,
            };

            if let Some(price) = quote_price {
                if alert.status == AlertStatus::Active
                    && should_trigger(alert.direction, alert.target_price, price)
                {
                    let now = Utc::now().to_rfc3339();
                    // Guard on ACTIVE so the latch is one-way even under
                    // concurrent evaluations.
                    let updated = sqlx::query(
                        "UPDATE price_alerts SET status = 'TRIGGERED', triggered_at = ? WHERE id = ? AND status = 'ACTIVE'",
                    )
                    .bind(&now)
                    .bind(alert.id)
                    .execute(self.db.pool())
                    .await?;

                    if updated.rows_affected() > 0 {
                        alert.status = AlertStatus::Triggered;
                        alert.triggered_at = Some(now);
                        tracing::info!(
                            user_id,
                            ticker = %alert.ticker,
                            target_price = alert.target_price,
                            price,
                            "price alert triggered"
                        );
                        self.notify_trigger(user_id, &alert, price).await;
                    }
                }
            }

            let current_price = quote_price.unwrap_or(0.0);
            let difference = if quote_price.is_some() {
                current_price - alert.target_price
            } else {
                0.0
            };
            results.push(AlertQuote {
                alert,
                current_price,
                difference,
            });
        }

        Ok(results)
    }

    async fn notify_trigger(&self, user_id: i64, alert: &PriceAlert, price: f64) {
        let crossed = match alert.direction {
            AlertDirection::Above => "risen above",
            AlertDirection::Below => "fallen below",
        };
        match self.users.get(user_id).await {
            Ok(Some(user)) => {
                self.notifier.dispatch(Notification::new(
                    user.email,
                    "Price Alert Triggered",
                    format!(
                        "{} has {} your target of ${:.2} (current price ${:.2})",
                        alert.stock_name, crossed, alert.target_price, price
                    ),
                ));
            }
            Ok(None) => tracing::debug!(user_id, "no user row for alert notification"),
            Err(e) => tracing::warn!(user_id, "failed to resolve alert recipient: {}", e),
        }
    }
}

use crate::db::PortfolioDb;
use crate::error::PortfolioError;
use crate::models::User;
use chrono::Utc;

pub struct UserStore {
    db: PortfolioDb,
}

impl UserStore {
    pub fn new(db: PortfolioDb) -> Self {
        Self { db }
    }

    /// Create a user row. Notifications are addressed to `email`.
    pub async fn create(&self, username: &str, email: &str) -> Result<User, PortfolioError> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(username)
        .bind(email)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(self.db.pool())
        .await?;

        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, PortfolioError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    /// Delete a user; owned rows cascade.
    pub async fn delete(&self, id: i64) -> Result<(), PortfolioError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = PortfolioDb::new("sqlite::memory:").await.unwrap();
        let store = UserStore::new(db);

        let user = store.create("alice", "alice@example.com").await.unwrap();
        assert!(user.id > 0);

        let fetched = store.get(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.email, "alice@example.com");

        assert!(store.get(9999).await.unwrap().is_none());
    }
}

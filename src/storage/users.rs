use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user, returning the stored row.
    pub async fn create_user(&self, username: &str) -> Result<User, DatabaseError> {
        let now = to_millis(chrono::Utc::now());
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (username, created_at) VALUES (?, ?)
             RETURNING id, username, created_at",
        )
        .bind(username)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_user())
    }

    /// All registered users, oldest first.
    pub async fn users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, username, created_at FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    pub async fn user_by_name(&self, username: &str) -> Result<User, DatabaseError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, created_at FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {username:?} does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list_users() {
        let db = Database::open(":memory:").await.unwrap();

        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        assert!(alice.id < bob.id);

        let users = db.users().await.unwrap();
        assert_eq!(users, vec![alice.clone(), bob]);
        assert_eq!(db.user_by_name("alice").await.unwrap(), alice);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        db.create_user("alice").await.unwrap();
        assert!(db.create_user("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let db = Database::open(":memory:").await.unwrap();
        let err = db.user_by_name("nobody").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

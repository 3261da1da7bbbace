use super::schema::Database;
use super::types::{Category, DatabaseError};
use crate::util::clean_text;

impl Database {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Create a category owned by `user_id`.
    ///
    /// The name is cleaned (control chars stripped, whitespace trimmed) and
    /// must not end up empty.
    pub async fn create_category(&self, user_id: i64, name: &str) -> Result<Category, DatabaseError> {
        let name = clean_text(name);
        if name.is_empty() {
            return Err(DatabaseError::InvalidInput(
                "Category name cannot be empty or whitespace-only".into(),
            ));
        }

        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO categories (user_id, name) VALUES (?, ?) RETURNING id")
                .bind(user_id)
                .bind(name.as_ref())
                .fetch_one(&self.pool)
                .await?;

        Ok(Category {
            id,
            user_id,
            name: name.into_owned(),
        })
    }

    /// Look up a category scoped to its owner.
    pub async fn category(&self, id: i64, user_id: i64) -> Result<Category, DatabaseError> {
        let row: Option<(i64, i64, String)> =
            sqlx::query_as("SELECT id, user_id, name FROM categories WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, user_id, name)| Category { id, user_id, name })
            .ok_or_else(|| DatabaseError::NotFound(format!("category {id} does not exist")))
    }
}

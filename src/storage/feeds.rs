use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedRow, NewFeed};
use crate::util::clean_text;

const FEED_COLUMNS: &str = "id, user_id, category_id, subscription, title, description, source, \
                            ttl, status, etag, last_updated";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`.
    ///
    /// A `category_id` that does not belong to the user is rejected with
    /// `NotFound`.
    pub async fn create_feed(&self, user_id: i64, feed: &NewFeed) -> Result<Feed, DatabaseError> {
        if let Some(category_id) = feed.category_id {
            self.category(category_id, user_id).await?;
        }

        let now = to_millis(chrono::Utc::now());
        let row: FeedRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (user_id, category_id, subscription, title, description, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(user_id)
        .bind(feed.category_id)
        .bind(feed.subscription.trim())
        .bind(clean_text(&feed.title).as_ref())
        .bind(&feed.description)
        .bind(&feed.source)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_feed())
    }

    /// Look up a feed scoped to its owner.
    pub async fn feed(&self, id: i64, user_id: i64) -> Result<Feed, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {id} does not exist")))
    }

    /// All feeds owned by a user, in creation order.
    pub async fn feeds_for_user(&self, user_id: i64) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE user_id = ? ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Feeds currently filed under a category.
    ///
    /// Returns `NotFound` when the category does not exist for the user, so
    /// a category removed mid-sync is distinguishable from an empty one.
    pub async fn feeds_in_category(
        &self,
        category_id: i64,
        user_id: i64,
    ) -> Result<Vec<Feed>, DatabaseError> {
        self.category(category_id, user_id).await?;

        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE category_id = ? AND user_id = ? ORDER BY id"
        ))
        .bind(category_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Write back a feed's cached metadata and sync bookkeeping.
    ///
    /// `last_updated` never moves backwards: the stored value is the later
    /// of the existing one and `feed.last_updated`. A missing value never
    /// clears a stored one.
    pub async fn update_feed(&self, feed: &Feed, user_id: i64) -> Result<(), DatabaseError> {
        let last_updated = feed.last_updated.map(to_millis);

        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                title = ?,
                description = ?,
                source = ?,
                ttl = ?,
                status = ?,
                etag = ?,
                last_updated = MAX(COALESCE(last_updated, ?), COALESCE(?, last_updated))
            WHERE id = ? AND user_id = ?
        "#,
        )
        .bind(clean_text(&feed.title).as_ref())
        .bind(&feed.description)
        .bind(&feed.source)
        .bind(feed.ttl)
        .bind(&feed.status)
        .bind(&feed.etag)
        .bind(last_updated)
        .bind(last_updated)
        .bind(feed.id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed {} does not exist", feed.id)));
        }
        Ok(())
    }
}

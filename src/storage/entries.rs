use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Entry, EntryRow, Marker, NewEntry};

/// Maximum number of entries returned by a single listing
const MAX_ENTRIES: i64 = 2000;

/// 10 columns * 50 rows stays well below SQLite's bound-parameter limit
const INSERT_BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Whether `user_id` already owns an entry with this GUID, in any feed.
    pub async fn entry_exists_by_guid(&self, guid: &str, user_id: i64) -> Result<bool, DatabaseError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM entries WHERE user_id = ? AND guid = ?)")
                .bind(user_id)
                .bind(guid)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Insert entries for a feed in slice order, returning how many rows were
    /// written.
    ///
    /// Rows whose GUID already exists for the user are skipped by the
    /// `UNIQUE(user_id, guid)` constraint rather than failing the batch, so
    /// two syncs racing on the same feed cannot duplicate entries.
    pub async fn create_entries(
        &self,
        entries: &[NewEntry],
        feed_id: i64,
        user_id: i64,
    ) -> Result<usize, DatabaseError> {
        // NotFound before touching entries
        self.feed(feed_id, user_id).await?;

        if entries.is_empty() {
            return Ok(0);
        }
        if entries.iter().any(|e| e.guid.is_empty()) {
            return Err(DatabaseError::InvalidInput("entry without GUID".into()));
        }

        let now = to_millis(chrono::Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for chunk in entries.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO entries \
                 (user_id, feed_id, guid, title, link, description, author, mark, saved, published, created_at) ",
            );

            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(user_id)
                    .push_bind(feed_id)
                    .push_bind(&entry.guid)
                    .push_bind(&entry.title)
                    .push_bind(&entry.link)
                    .push_bind(&entry.description)
                    .push_bind(&entry.author)
                    .push_bind(entry.mark.as_str())
                    .push_bind(entry.saved)
                    .push_bind(entry.published.map(to_millis))
                    .push_bind(now);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        let skipped = entries.len() as u64 - inserted;
        if skipped > 0 {
            tracing::debug!(feed_id, skipped, "Entries already present, ignored");
        }
        Ok(inserted as usize)
    }

    /// Entries of one feed, oldest first, optionally filtered by marker.
    pub async fn entries_for_feed(
        &self,
        feed_id: i64,
        user_id: i64,
        marker: Option<Marker>,
    ) -> Result<Vec<Entry>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, user_id, feed_id, guid, title, link, description, author, mark, saved, \
             published, created_at FROM entries WHERE feed_id = ",
        );
        builder.push_bind(feed_id);
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
        if let Some(marker) = marker {
            builder.push(" AND mark = ");
            builder.push_bind(marker.as_str());
        }
        builder.push(" ORDER BY created_at, id LIMIT ");
        builder.push_bind(MAX_ENTRIES);

        let rows: Vec<EntryRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(EntryRow::into_entry).collect())
    }

    /// Change an entry's marker. Returns whether the marker changed.
    pub async fn mark_entry(
        &self,
        entry_id: i64,
        user_id: i64,
        marker: Marker,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE entries SET mark = ? WHERE id = ? AND user_id = ? AND mark <> ?")
            .bind(marker.as_str())
            .bind(entry_id)
            .bind(user_id)
            .bind(marker.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM entries WHERE id = ? AND user_id = ?)")
                .bind(entry_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(DatabaseError::NotFound(format!("entry {entry_id} does not exist")))
        }
    }

    /// Flag or unflag an entry as saved.
    pub async fn set_entry_saved(
        &self,
        entry_id: i64,
        user_id: i64,
        saved: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE entries SET saved = ? WHERE id = ? AND user_id = ?")
            .bind(saved)
            .bind(entry_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("entry {entry_id} does not exist")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewFeed;
    use pretty_assertions::assert_eq;

    fn new_entry(feed_id: i64, guid: &str) -> NewEntry {
        NewEntry {
            feed_id,
            guid: guid.to_string(),
            title: format!("Title {guid}"),
            link: format!("https://example.com/{guid}"),
            description: "Body".to_string(),
            author: String::new(),
            mark: Marker::Unread,
            saved: false,
            published: None,
        }
    }

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed(user.id, &NewFeed::new("https://example.com/rss"))
            .await
            .unwrap();
        (db, user.id, feed.id)
    }

    #[tokio::test]
    async fn test_create_entries_preserves_order() {
        let (db, user_id, feed_id) = setup().await;
        let batch: Vec<_> = ["c", "a", "b"].iter().map(|g| new_entry(feed_id, g)).collect();

        assert_eq!(db.create_entries(&batch, feed_id, user_id).await.unwrap(), 3);

        let guids: Vec<_> = db
            .entries_for_feed(feed_id, user_id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.guid)
            .collect();
        assert_eq!(guids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_guid_exists_is_scoped_per_user() {
        let (db, user_id, feed_id) = setup().await;
        let bob = db.create_user("bob").await.unwrap();

        db.create_entries(&[new_entry(feed_id, "g1")], feed_id, user_id)
            .await
            .unwrap();

        assert!(db.entry_exists_by_guid("g1", user_id).await.unwrap());
        assert!(!db.entry_exists_by_guid("g1", bob.id).await.unwrap());
        assert!(!db.entry_exists_by_guid("g2", user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_guid_ignored() {
        let (db, user_id, feed_id) = setup().await;
        db.create_entries(&[new_entry(feed_id, "g1")], feed_id, user_id)
            .await
            .unwrap();

        let inserted = db
            .create_entries(&[new_entry(feed_id, "g1"), new_entry(feed_id, "g2")], feed_id, user_id)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.entries_for_feed(feed_id, user_id, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_entries_for_missing_feed() {
        let (db, user_id, feed_id) = setup().await;
        let err = db
            .create_entries(&[new_entry(feed_id, "g1")], feed_id + 1, user_id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_guid_rejected() {
        let (db, user_id, feed_id) = setup().await;
        let err = db
            .create_entries(&[new_entry(feed_id, "")], feed_id, user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_mark_entry_and_filter() {
        let (db, user_id, feed_id) = setup().await;
        db.create_entries(
            &[new_entry(feed_id, "g1"), new_entry(feed_id, "g2")],
            feed_id,
            user_id,
        )
        .await
        .unwrap();
        let first = db.entries_for_feed(feed_id, user_id, None).await.unwrap()[0].clone();
        assert_eq!(first.mark, Marker::Unread);

        assert!(db.mark_entry(first.id, user_id, Marker::Read).await.unwrap());
        assert!(!db.mark_entry(first.id, user_id, Marker::Read).await.unwrap());

        let unread = db
            .entries_for_feed(feed_id, user_id, Some(Marker::Unread))
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].guid, "g2");

        db.set_entry_saved(first.id, user_id, true).await.unwrap();
        let read = db
            .entries_for_feed(feed_id, user_id, Some(Marker::Read))
            .await
            .unwrap();
        assert!(read[0].saved);

        assert!(db
            .mark_entry(first.id + 100, user_id, Marker::Read)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

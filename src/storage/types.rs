use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The requested row does not exist or is not owned by the acting user
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching SQL
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another process holds the database lock
    #[error("Another instance of syndication appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }
}

// ============================================================================
// Timestamp helpers
// ============================================================================

/// Timestamps are stored as unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Marker
// ============================================================================

/// Read state of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    #[default]
    Unread,
    Read,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::Unread => "unread",
            Marker::Read => "read",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown marker: {0:?}")]
pub struct UnknownMarker(pub String);

impl FromStr for Marker {
    type Err = UnknownMarker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unread" => Ok(Marker::Unread),
            "read" => Ok(Marker::Read),
            _ => Err(UnknownMarker(s.to_owned())),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

/// A subscription owned by one user, with the cached metadata and the
/// bookkeeping used for conditional fetches.
///
/// `etag` is empty until a server hands one out. `last_updated` is `None`
/// until the first time new content was observed and never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub subscription: String,
    pub title: String,
    pub description: String,
    pub source: String,
    /// Publisher's TTL hint in minutes, 0 when absent
    pub ttl: i64,
    pub status: Option<String>,
    #[serde(skip)]
    pub etag: String,
    #[serde(skip)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Input for creating a feed.
#[derive(Debug, Clone, Default)]
pub struct NewFeed {
    pub subscription: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub category_id: Option<i64>,
}

impl NewFeed {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    #[serde(skip)]
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub mark: Marker,
    pub saved: bool,
    pub published: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An entry produced by a sync that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub mark: Marker,
    pub saved: bool,
    pub published: Option<DateTime<Utc>>,
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub subscription: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub ttl: i64,
    pub status: Option<String>,
    pub etag: String,
    pub last_updated: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            subscription: self.subscription,
            title: self.title,
            description: self.description,
            source: self.source,
            ttl: self.ttl,
            status: self.status,
            etag: self.etag,
            last_updated: self.last_updated.map(from_millis),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub mark: String,
    pub saved: bool,
    pub published: Option<i64>,
    pub created_at: i64,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Entry {
        let mark = self.mark.parse().unwrap_or_else(|e| {
            tracing::warn!(entry_id = self.id, error = %e, "Unreadable marker, treating as unread");
            Marker::Unread
        });

        Entry {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            guid: self.guid,
            title: self.title,
            link: self.link,
            description: self.description,
            author: self.author,
            mark,
            saved: self.saved,
            published: self.published.map(from_millis),
            created_at: from_millis(self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_parses_case_insensitively() {
        assert_eq!("UNREAD".parse::<Marker>(), Ok(Marker::Unread));
        assert_eq!(" read ".parse::<Marker>(), Ok(Marker::Read));
        assert!("saved".parse::<Marker>().is_err());
        assert!("".parse::<Marker>().is_err());
    }

    #[test]
    fn test_marker_defaults_to_unread() {
        assert_eq!(Marker::default(), Marker::Unread);
        assert_eq!(Marker::default().to_string(), "unread");
    }

    #[test]
    fn test_millis_round_trip_keeps_precision() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(to_millis(ts)), ts);
    }
}

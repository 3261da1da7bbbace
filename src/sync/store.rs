use std::future::Future;

use crate::storage::{Category, Database, DatabaseError, Feed, NewEntry, NewFeed, User};

/// Persistence the sync engine needs, scoped to the acting user.
///
/// `Database` is the production implementation; tests may supply their own.
pub trait Store: Send + Sync + 'static {
    fn users(&self) -> impl Future<Output = Result<Vec<User>, DatabaseError>> + Send;

    fn feeds_of_user(&self, user: &User) -> impl Future<Output = Result<Vec<Feed>, DatabaseError>> + Send;

    /// `NotFound` when the category does not exist for the user.
    fn feeds_of_category(
        &self,
        category: &Category,
        user: &User,
    ) -> impl Future<Output = Result<Vec<Feed>, DatabaseError>> + Send;

    fn entry_exists_by_guid(
        &self,
        guid: &str,
        user: &User,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Insert in slice order. `NotFound` when the feed is gone.
    fn create_entries(
        &self,
        entries: &[NewEntry],
        feed: &Feed,
        user: &User,
    ) -> impl Future<Output = Result<usize, DatabaseError>> + Send;

    fn update_feed(&self, feed: &Feed, user: &User) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn create_feed(
        &self,
        user: &User,
        feed: &NewFeed,
    ) -> impl Future<Output = Result<Feed, DatabaseError>> + Send;
}

impl Store for Database {
    async fn users(&self) -> Result<Vec<User>, DatabaseError> {
        Database::users(self).await
    }

    async fn feeds_of_user(&self, user: &User) -> Result<Vec<Feed>, DatabaseError> {
        self.feeds_for_user(user.id).await
    }

    async fn feeds_of_category(&self, category: &Category, user: &User) -> Result<Vec<Feed>, DatabaseError> {
        self.feeds_in_category(category.id, user.id).await
    }

    async fn entry_exists_by_guid(&self, guid: &str, user: &User) -> Result<bool, DatabaseError> {
        Database::entry_exists_by_guid(self, guid, user.id).await
    }

    async fn create_entries(
        &self,
        entries: &[NewEntry],
        feed: &Feed,
        user: &User,
    ) -> Result<usize, DatabaseError> {
        Database::create_entries(self, entries, feed.id, user.id).await
    }

    async fn update_feed(&self, feed: &Feed, user: &User) -> Result<(), DatabaseError> {
        Database::update_feed(self, feed, user.id).await
    }

    async fn create_feed(&self, user: &User, feed: &NewFeed) -> Result<Feed, DatabaseError> {
        Database::create_feed(self, user.id, feed).await
    }
}

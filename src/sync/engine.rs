use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use super::detector::{check_for_updates, Detection};
use super::store::Store;
use super::{SubscribeError, SyncError};
use crate::config::SyncConfig;
use crate::feed::Fetcher;
use crate::storage::{Category, Feed, NewFeed, User};
use crate::util::{validate_subscription, AddressPolicy};

/// Knobs the engine reads on every sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub staleness_window: Duration,
    /// Stretch the staleness window up to the feed's TTL hint
    pub respect_feed_ttl: bool,
    /// Feeds synced at once during a fan-out; 1 is sequential
    pub max_concurrent_feeds: usize,
    pub address_policy: AddressPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            staleness_window: config.staleness_window(),
            respect_feed_ttl: config.respect_feed_ttl,
            max_concurrent_feeds: config.max_concurrent_feeds.max(1),
            address_policy: AddressPolicy::from_allow_internal(config.allow_private_addresses),
        }
    }
}

/// What a successful `sync_feed` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSync {
    /// Synced within the staleness window; no request was made
    Fresh,
    /// Fetched, nothing new
    Unchanged,
    Updated { new_entries: usize },
}

/// Outcome of one feed inside a fan-out.
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub user_id: i64,
    pub result: Result<FeedSync, SyncError>,
}

/// A user whose feeds could not be listed during `sync_all_users`.
#[derive(Debug)]
pub struct UserFailure {
    pub user_id: i64,
    pub error: SyncError,
}

/// Per-unit results of a fan-out, in feed order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FeedOutcome>,
    pub failed_users: Vec<UserFailure>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Entries inserted across all feeds.
    pub fn new_entries(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                Ok(FeedSync::Updated { new_entries }) => new_entries,
                _ => 0,
            })
            .sum()
    }

    fn merge(&mut self, other: SyncReport) {
        self.outcomes.extend(other.outcomes);
        self.failed_users.extend(other.failed_users);
    }
}

/// One async lock per feed id, created on first use.
#[derive(Debug, Default)]
struct FeedLocks(Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>);

impl FeedLocks {
    fn get(&self, feed_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(feed_id).or_default())
    }
}

/// Drives feed syncs at every granularity: one feed, a category, a user or
/// everyone.
///
/// A single feed sync reports its error to the caller. Fan-outs record each
/// feed's outcome and carry on; they only fail when their own lookup fails.
pub struct SyncEngine<S> {
    store: S,
    fetcher: Fetcher,
    settings: SyncSettings,
    locks: FeedLocks,
}

impl<S: Store> SyncEngine<S> {
    pub fn new(store: S, fetcher: Fetcher, settings: SyncSettings) -> Self {
        Self {
            store,
            fetcher,
            settings,
            locks: FeedLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// How long after `last_updated` the feed is left alone.
    pub fn staleness_window(&self, feed: &Feed) -> Duration {
        let window = self.settings.staleness_window;
        if self.settings.respect_feed_ttl && feed.ttl > 0 {
            let ttl = Duration::from_secs(feed.ttl.unsigned_abs().saturating_mul(60));
            window.max(ttl)
        } else {
            window
        }
    }

    fn is_fresh(&self, feed: &Feed) -> bool {
        let Some(last) = feed.last_updated else {
            return false;
        };
        chrono::Duration::from_std(self.staleness_window(feed))
            .ok()
            .and_then(|window| last.checked_add_signed(window))
            .map_or(true, |until| Utc::now() < until)
    }

    /// Sync one feed and persist anything new.
    ///
    /// Concurrent calls for the same feed run one after the other. Errors are
    /// returned as-is; nothing is retried.
    pub async fn sync_feed(&self, feed: &mut Feed, user: &User) -> Result<FeedSync, SyncError> {
        let lock = self.locks.get(feed.id);
        let _guard = lock.lock().await;

        if self.is_fresh(feed) {
            tracing::debug!(feed_id = feed.id, "Feed synced recently, skipping");
            return Ok(FeedSync::Fresh);
        }

        let entries = match check_for_updates(&self.store, &self.fetcher, feed, user).await? {
            Detection::Unchanged => {
                tracing::debug!(feed_id = feed.id, "Feed unchanged");
                return Ok(FeedSync::Unchanged);
            }
            Detection::Changed(entries) => entries,
        };

        let new_entries = self.store.create_entries(&entries, feed, user).await?;
        self.store.update_feed(feed, user).await?;

        tracing::info!(feed_id = feed.id, user_id = user.id, new_entries, "Feed synced");
        Ok(FeedSync::Updated { new_entries })
    }

    /// Sync every feed filed under `category`.
    pub async fn sync_category(&self, category: &Category, user: &User) -> Result<SyncReport, SyncError> {
        let feeds = self.store.feeds_of_category(category, user).await?;
        Ok(self.sync_feeds(feeds, user).await)
    }

    /// Sync every feed the user subscribes to.
    pub async fn sync_user(&self, user: &User) -> Result<SyncReport, SyncError> {
        let feeds = self.store.feeds_of_user(user).await?;
        Ok(self.sync_feeds(feeds, user).await)
    }

    /// Sync every user's feeds. A user whose feeds cannot be listed is
    /// recorded in the report and skipped.
    pub async fn sync_all_users(&self) -> Result<SyncReport, SyncError> {
        let users = self.store.users().await?;
        let mut report = SyncReport::default();

        for user in &users {
            match self.sync_user(user).await {
                Ok(user_report) => report.merge(user_report),
                Err(error) => {
                    tracing::warn!(user_id = user.id, error = %error, "Failed to list feeds for user");
                    report.failed_users.push(UserFailure {
                        user_id: user.id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            users = users.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            new_entries = report.new_entries(),
            "Sync run complete"
        );
        Ok(report)
    }

    /// Validate and store a new subscription.
    ///
    /// Without a title the feed is fetched first to discover one; a feed that
    /// cannot be fetched at that point is `SubscribeError::Unreachable`.
    pub async fn subscribe(&self, user: &User, mut new: NewFeed) -> Result<Feed, SubscribeError> {
        let url = validate_subscription(&new.subscription, self.settings.address_policy)?;
        new.subscription = url.into();

        if new.title.trim().is_empty() {
            let mut probe = Feed {
                id: 0,
                user_id: user.id,
                category_id: new.category_id,
                subscription: new.subscription.clone(),
                title: String::new(),
                description: String::new(),
                source: String::new(),
                ttl: 0,
                status: None,
                etag: String::new(),
                last_updated: None,
            };
            self.fetcher
                .fetch_for_preview(&mut probe)
                .await
                .map_err(SubscribeError::Unreachable)?;

            new.title = probe.title;
            new.description = probe.description;
            new.source = probe.source;
        }

        let feed = self.store.create_feed(user, &new).await?;
        tracing::info!(feed_id = feed.id, user_id = user.id, subscription = %feed.subscription, "Subscribed");
        Ok(feed)
    }

    async fn sync_feeds(&self, feeds: Vec<Feed>, user: &User) -> SyncReport {
        let pending: Vec<_> = feeds
            .into_iter()
            .map(|feed| self.feed_outcome(feed, user))
            .collect();

        let outcomes: Vec<FeedOutcome> = stream::iter(pending)
            .buffered(self.settings.max_concurrent_feeds.max(1))
            .collect()
            .await;

        SyncReport {
            outcomes,
            failed_users: Vec::new(),
        }
    }

    async fn feed_outcome(&self, mut feed: Feed, user: &User) -> FeedOutcome {
        let result = self.sync_feed(&mut feed, user).await;
        if let Err(e) = &result {
            tracing::warn!(
                feed_id = feed.id,
                user_id = user.id,
                subscription = %feed.subscription,
                error = %e,
                "Feed sync failed"
            );
        }
        FeedOutcome {
            feed_id: feed.id,
            user_id: user.id,
            result,
        }
    }
}

//! Feed synchronization: change detection, entry materialization, the
//! fan-out engine and its periodic scheduler.

pub mod detector;
pub mod engine;
pub mod materialize;
pub mod scheduler;
pub mod store;

use thiserror::Error;

use crate::feed::FetchError;
use crate::storage::DatabaseError;
use crate::util::SubscriptionError;

pub use detector::{check_for_updates, Detection};
pub use engine::{FeedOutcome, FeedSync, SyncEngine, SyncReport, SyncSettings, UserFailure};
pub use materialize::materialize;
pub use scheduler::Scheduler;
pub use store::Store;

/// Failure of a single feed sync or of a lookup issued by a fan-out.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl SyncError {
    /// The feed, category or user vanished from the store mid-sync.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_not_found())
    }
}

/// Why a new subscription could not be created.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Invalid subscription URL: {0}")]
    InvalidUrl(#[from] SubscriptionError),

    /// The feed could not be fetched to discover its metadata
    #[error("Feed is unreachable: {0}")]
    Unreachable(#[source] FetchError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

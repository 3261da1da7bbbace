//! Feed synchronization engine for a self-hosted RSS/Atom aggregator.
//!
//! Users subscribe to feeds; [`sync::SyncEngine`] polls them with
//! conditional requests, stores only entries the user has not seen and
//! reports per-feed outcomes. [`sync::Scheduler`] runs it periodically.

pub mod config;
pub mod feed;
pub mod storage;
pub mod sync;
pub mod util;

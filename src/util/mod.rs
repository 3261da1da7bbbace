//! Helpers shared by the fetcher and the sync engine.
//!
//! - **Subscription validation**: scheme and address checks applied before a
//!   feed is stored
//! - **Text cleaning**: control characters and ANSI escapes are removed from
//!   titles that come from remote documents

mod subscription;
mod text;

pub use subscription::{validate_subscription, AddressPolicy, SubscriptionError};
pub use text::clean_text;

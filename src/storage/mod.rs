//! SQLite-backed persistence for users, categories, feeds and entries.
//!
//! The sync engine only sees this through the [`crate::sync::Store`] trait;
//! the inherent methods here also serve tests and the binary.

mod categories;
mod entries;
mod feeds;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{
    Category, DatabaseError, Entry, Feed, Marker, NewEntry, NewFeed, UnknownMarker, User,
};

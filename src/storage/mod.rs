//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with a single table:
//! - users(id, name, money, prestige, level, message_count)
//!
//! The store does no caching of its own; [`crate::cache::UserCache`] sits in
//! front of it and is the only reader of live data.

pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use sqlite::{SqliteStore, StoreStats};

use crate::Result;
use crate::user::UserRow;

/// Durable persistence for user rows.
///
/// Every call blocks the calling thread for the duration of the I/O.
pub trait UserStore: Send + Sync {
    /// Load a row, `None` if the id has never been stored.
    fn get(&self, id: i64) -> Result<Option<UserRow>>;

    /// Insert a row with default values and return it as stored.
    ///
    /// Fails with [`crate::Error::ConcurrentCreateConflict`] if the row
    /// already exists.
    fn insert(&self, id: i64, name: &str) -> Result<UserRow>;

    /// Write every mutable column of `row`.
    ///
    /// Fails with [`crate::Error::RecordNotFound`] if no row matched.
    fn update(&self, row: &UserRow) -> Result<()>;
}

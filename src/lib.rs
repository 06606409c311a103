//! # Dizznem - write-back user state for a chat bot
//!
//! Per-user state (balance, level, message count, prestige) is mutated by
//! event handlers at chat speed and persisted to SQLite at a much lower rate.
//!
//! Dizznem provides:
//! - A resident user cache with exactly one live record per user id
//! - Revision-based dirty tracking that never loses a mutation racing a save
//! - A periodic flush scheduler on the tokio runtime
//! - A scoped flush guard that persists everything dirty on the way out
//! - SQLite-backed storage over a fixed `users` table

pub mod cache;
pub mod commands;
pub mod config;
pub mod money;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
pub mod ui;
pub mod user;

// Re-exports for convenient access
pub use cache::{FlushReport, UserCache};
pub use scheduler::FlushScheduler;
pub use shutdown::{FlushGuard, ShutdownOutcome};
pub use storage::{SqliteStore, UserStore};
pub use user::{User, UserGuard, UserRow};

/// Result type alias for Dizznem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Dizznem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection, I/O or constraint failure in the backing store.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// No row exists for the id. Used to tell "load" from "insert" and to
    /// report an update that touched nothing.
    #[error("User not found: {0}")]
    RecordNotFound(i64),

    /// A row for this id was created by someone else first.
    #[error("User {0} was created concurrently")]
    ConcurrentCreateConflict(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: f64, available: f64 },
}

//! Database schema definitions
//!
//! The `users` table is read by tooling outside this crate (manual
//! inspection, backups), so column names and types must stay stable.

/// SQL to create the users table
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    money REAL DEFAULT 0,
    prestige INTEGER DEFAULT 0,
    level INTEGER DEFAULT 0,
    message_count INTEGER DEFAULT 0
)
"#;

/// Columns in the order `row_to_user` expects them
pub const USER_COLUMNS: &str = "id, name, money, prestige, level, message_count";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_USERS_TABLE]
}

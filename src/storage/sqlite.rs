//! SQLite storage implementation

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::UserStore;
use super::schema;
use crate::user::UserRow;
use crate::{Error, Result};

/// SQLite-backed storage for user rows
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // journal_mode answers with a row, so it can't go through execute
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened user database");

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Read-only queries for tooling ==========

    /// Count all stored users
    pub fn count_users(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Richest users first, ties broken by id
    pub fn top_by_money(&self, limit: usize) -> Result<Vec<UserRow>> {
        self.top_by("money DESC, id ASC", limit)
    }

    /// Highest level first, then most messages
    pub fn top_by_level(&self, limit: usize) -> Result<Vec<UserRow>> {
        self.top_by("level DESC, message_count DESC, id ASC", limit)
    }

    fn top_by(&self, order: &str, limit: usize) -> Result<Vec<UserRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM users ORDER BY {} LIMIT ?1",
            schema::USER_COLUMNS,
            order
        );
        let mut stmt = conn.prepare(&sql)?;

        let users = stmt
            .query_map([limit as i64], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(users)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let (users, total_money, total_messages) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(money), 0.0), COALESCE(SUM(message_count), 0) FROM users",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        Ok(StoreStats {
            users: users as usize,
            total_money,
            total_messages: total_messages.max(0) as u64,
        })
    }
}

impl UserStore for SqliteStore {
    fn get(&self, id: i64) -> Result<Option<UserRow>> {
        let conn = self.conn.lock();
        select_user(&conn, id)
    }

    fn insert(&self, id: i64, name: &str) -> Result<UserRow> {
        let conn = self.conn.lock();
        match conn.execute(
            "INSERT INTO users (id, name) VALUES (?1, ?2)",
            params![id, name],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(Error::ConcurrentCreateConflict(id));
            }
            Err(e) => return Err(e.into()),
        }

        select_user(&conn, id)?.ok_or(Error::RecordNotFound(id))
    }

    fn update(&self, row: &UserRow) -> Result<()> {
        let message_count = i64::try_from(row.message_count).map_err(|_| {
            Error::InvalidInput(format!("message count {} out of range", row.message_count))
        })?;

        let changed = self.conn.lock().execute(
            r#"
            UPDATE users
            SET name = ?1, money = ?2, prestige = ?3, level = ?4, message_count = ?5
            WHERE id = ?6
            "#,
            params![
                row.name,
                row.money,
                row.prestige,
                row.level,
                message_count,
                row.id,
            ],
        )?;

        if changed == 0 {
            return Err(Error::RecordNotFound(row.id));
        }
        Ok(())
    }
}

fn select_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", schema::USER_COLUMNS);
    conn.query_row(&sql, [id], row_to_user)
        .optional()
        .map_err(Into::into)
}

/// Helper to convert a row to a UserRow
fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    let message_count: i64 = row.get(5)?;
    let message_count = u64::try_from(message_count).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Integer, Box::new(e))
    })?;

    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        money: row.get(2)?,
        prestige: row.get(3)?,
        level: row.get(4)?,
        message_count,
    })
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub users: usize,
    pub total_money: f64,
    pub total_messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_get() {
        let store = SqliteStore::open_in_memory().unwrap();

        let inserted = store.insert(42, "alice").unwrap();
        assert_eq!(inserted.id, 42);
        assert_eq!(inserted.name, "alice");
        assert_eq!(inserted.money, 0.0);
        assert_eq!(inserted.level, 0);
        assert_eq!(inserted.message_count, 0);

        let loaded = store.get(42).unwrap().unwrap();
        assert_eq!(loaded, inserted);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get(7).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_is_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(1, "first").unwrap();

        let err = store.insert(1, "second").unwrap_err();
        assert!(matches!(err, Error::ConcurrentCreateConflict(1)));
        assert_eq!(store.get(1).unwrap().unwrap().name, "first");
    }

    #[test]
    fn test_update_writes_all_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut row = store.insert(5, "bob").unwrap();

        row.name = "bobby".to_string();
        row.money = 1234.5;
        row.prestige = 2;
        row.level = 3;
        row.message_count = 456;
        store.update(&row).unwrap();

        assert_eq!(store.get(5).unwrap().unwrap(), row);
    }

    #[test]
    fn test_update_missing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = UserRow::new(99, "ghost");

        let err = store.update(&row).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(99)));
    }

    #[test]
    fn test_leaderboards_and_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, money, level, messages) in [(1, 10.0, 4, 900), (2, 500.0, 1, 120), (3, 75.5, 4, 1000)] {
            let mut row = store.insert(id, &format!("user{id}")).unwrap();
            row.money = money;
            row.level = level;
            row.message_count = messages;
            store.update(&row).unwrap();
        }

        let rich: Vec<i64> = store.top_by_money(2).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(rich, vec![2, 3]);

        let levels: Vec<i64> = store.top_by_level(3).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(levels, vec![3, 1, 2]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.users, 3);
        assert!((stats.total_money - 585.5).abs() < 1e-9);
        assert_eq!(stats.total_messages, 2020);
        assert_eq!(store.count_users().unwrap(), 3);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let mut row = store.insert(11, "carol").unwrap();
            row.money = 3.25;
            store.update(&row).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(11).unwrap().unwrap().money, 3.25);
    }
}

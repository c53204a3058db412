//! Database connection management

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;

use super::migrations;

/// SQLite database backing the offline store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically. Existing rows are preserved.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|error| {
            Error::StorageUnavailable(format!("cannot open {}: {error}", path.display()))
        })?;

        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        tracing::debug!("Opened offline store at {}", path.display());
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;

        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` so that a returned write is already on disk
    fn configure(&self) -> Result<()> {
        // In-memory databases report "memory" and ignore WAL
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .ok();
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, surfacing any error from flushing it
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, error)| Error::StorageUnavailable(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("satchel.db");

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
        db.close().unwrap();
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("satchel.db");

        let db = Database::open(&db_path).unwrap();
        db.connection()
            .execute(
                "INSERT INTO assignments (id, subject, due_date, synced, last_modified, offline_created, payload)
                 VALUES ('a1', 'math', NULL, 1, 10, 0, '{}')",
                [],
            )
            .unwrap();
        db.close().unwrap();

        let reopened = Database::open(&db_path).unwrap();
        let count: i64 = reopened
            .connection()
            .query_row("SELECT COUNT(*) FROM assignments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}

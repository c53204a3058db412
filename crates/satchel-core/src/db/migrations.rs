//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
///
/// Every migration is additive so reopening an existing store never drops rows.
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated offline store to version {version}");
    Ok(())
}

/// Migration to version 1: record collections and the sync queue
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS assignments (
                id TEXT PRIMARY KEY,
                subject TEXT,
                due_date TEXT,
                synced INTEGER NOT NULL DEFAULT 0,
                last_modified INTEGER NOT NULL,
                offline_created INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_assignments_subject ON assignments(subject)",
            "CREATE INDEX IF NOT EXISTS idx_assignments_due_date ON assignments(due_date)",
            "CREATE INDEX IF NOT EXISTS idx_assignments_synced ON assignments(synced)",
            "CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                assignment_id TEXT,
                student_id TEXT,
                synced INTEGER NOT NULL DEFAULT 0,
                last_modified INTEGER NOT NULL,
                offline_created INTEGER NOT NULL DEFAULT 0,
                payload TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_submissions_assignment ON submissions(assignment_id)",
            "CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_id)",
            "CREATE INDEX IF NOT EXISTS idx_submissions_synced ON submissions(synced)",
            "CREATE TABLE IF NOT EXISTS sync_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                record_type TEXT NOT NULL,
                record_id TEXT NOT NULL,
                action TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                error TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_type ON sync_queue(record_type)",
        ],
    )
}

/// Migration to version 2: last failure time for queue diagnostics
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "ALTER TABLE sync_queue ADD COLUMN last_attempt_at INTEGER",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_retries ON sync_queue(retries)",
        ],
    )
}

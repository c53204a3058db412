//! Sync queue repository implementation

use crate::error::Result;
use crate::models::{QueueEntryId, QueueItem, RecordPayload, SyncAction};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for mutation queue storage
pub trait QueueRepository {
    /// Append an item behind every existing entry
    fn append(&self, item: &QueueItem) -> Result<()>;

    /// Every entry in enqueue order
    fn list(&self) -> Result<Vec<QueueItem>>;

    /// Remove an entry; returns whether it existed
    fn remove(&self, id: &QueueEntryId) -> Result<bool>;

    /// Count a failed attempt without moving the entry; returns the new retry count
    fn record_failure(
        &self,
        id: &QueueEntryId,
        error: &str,
        attempted_at: i64,
    ) -> Result<Option<u32>>;

    /// Clear the retry counter of one entry, or of every entry when `id` is `None`
    fn reset_retries(&self, id: Option<&QueueEntryId>) -> Result<usize>;

    /// Number of queued entries
    fn count(&self) -> Result<usize>;

    /// Number of entries whose retry counter reached `max_retries`
    fn count_exhausted(&self, max_retries: u32) -> Result<usize>;

    /// Drop every entry
    fn clear(&self) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
        let id: String = row.get(0)?;
        let action: String = row.get(1)?;
        let payload: String = row.get(2)?;

        let id = id
            .parse::<QueueEntryId>()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error)))?;
        let action = action
            .parse::<SyncAction>()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(error)))?;
        let payload = serde_json::from_str::<RecordPayload>(&payload)
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(error)))?;

        Ok(QueueItem {
            id,
            action,
            payload,
            timestamp: row.get(3)?,
            retries: row.get(4)?,
            error: row.get(5)?,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn append(&self, item: &QueueItem) -> Result<()> {
        let payload = serde_json::to_string(&item.payload)?;
        self.conn.execute(
            "INSERT INTO sync_queue (id, record_type, record_id, action, payload, timestamp, retries, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id.as_str(),
                item.kind().as_str(),
                item.record_id().as_str(),
                item.action.as_str(),
                payload,
                item.timestamp,
                item.retries,
                item.error,
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, payload, timestamp, retries, error
             FROM sync_queue
             ORDER BY seq ASC",
        )?;

        let mut items = Vec::new();
        for row in stmt.query_map([], Self::parse_item)? {
            match row {
                Ok(item) => items.push(item),
                // One corrupt entry must not hide the rest of the queue
                Err(rusqlite::Error::FromSqlConversionFailure(column, _, error)) => {
                    tracing::warn!(column, "Skipping undecodable queue entry: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(items)
    }

    fn remove(&self, id: &QueueEntryId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn record_failure(
        &self,
        id: &QueueEntryId,
        error: &str,
        attempted_at: i64,
    ) -> Result<Option<u32>> {
        let retries = self
            .conn
            .query_row(
                "UPDATE sync_queue
                 SET retries = retries + 1, error = ?2, last_attempt_at = ?3
                 WHERE id = ?1
                 RETURNING retries",
                params![id.as_str(), error, attempted_at],
                |row| row.get(0),
            )
            .optional()?;
        Ok(retries)
    }

    fn reset_retries(&self, id: Option<&QueueEntryId>) -> Result<usize> {
        let rows = match id {
            Some(id) => self.conn.execute(
                "UPDATE sync_queue SET retries = 0, error = NULL WHERE id = ?1",
                params![id.as_str()],
            )?,
            None => self
                .conn
                .execute("UPDATE sync_queue SET retries = 0, error = NULL", [])?,
        };
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn count_exhausted(&self, max_retries: u32) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE retries >= ?1",
            params![max_retries],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Assignment, Record, Submission};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn item(action: SyncAction, id: &str) -> QueueItem {
        let record = Record::new(
            id.parse().unwrap(),
            Submission::new("a1", "student-1", serde_json::json!({"q1": id})),
        );
        QueueItem::new(action, record.into_payload())
    }

    #[test]
    fn test_append_and_list_in_fifo_order() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = item(SyncAction::Create, "s1");
        let second = QueueItem::new(
            SyncAction::Update,
            Record::new("a1".parse().unwrap(), Assignment::new("Quiz", "math")).into_payload(),
        );
        let third = item(SyncAction::Delete, "s1");
        for entry in [&first, &second, &third] {
            repo.append(entry).unwrap();
        }

        let listed = repo.list().unwrap();
        assert_eq!(listed, vec![first, second, third]);
    }

    #[test]
    fn test_list_skips_undecodable_entries() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = item(SyncAction::Create, "s1");
        repo.append(&first).unwrap();
        db.connection()
            .execute(
                "INSERT INTO sync_queue (id, record_type, record_id, action, payload, timestamp, retries, error)
                 VALUES ('018f0000-0000-7000-8000-000000000000', 'submission', 's2', 'create', '{not json', 0, 0, NULL)",
                [],
            )
            .unwrap();
        let last = item(SyncAction::Update, "s3");
        repo.append(&last).unwrap();

        assert_eq!(repo.list().unwrap(), vec![first, last]);
        assert_eq!(repo.count().unwrap(), 3);
    }

    #[test]
    fn test_record_failure_keeps_position() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = item(SyncAction::Create, "s1");
        let second = item(SyncAction::Create, "s2");
        repo.append(&first).unwrap();
        repo.append(&second).unwrap();

        assert_eq!(repo.record_failure(&first.id, "HTTP 500", 42).unwrap(), Some(1));

        let listed = repo.list().unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[0].retries, 1);
        assert_eq!(listed[0].error.as_deref(), Some("HTTP 500"));
        assert_eq!(listed[1].id, second.id);
    }

    #[test]
    fn test_remove_and_count() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = item(SyncAction::Create, "s1");
        repo.append(&first).unwrap();
        assert_eq!(repo.count().unwrap(), 1);

        assert!(repo.remove(&first.id).unwrap());
        assert!(!repo.remove(&first.id).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
        assert_eq!(repo.record_failure(&first.id, "gone", 1).unwrap(), None);
    }

    #[test]
    fn test_exhausted_count_and_reset() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = item(SyncAction::Create, "s1");
        let second = item(SyncAction::Create, "s2");
        repo.append(&first).unwrap();
        repo.append(&second).unwrap();
        for _ in 0..3 {
            repo.record_failure(&first.id, "boom", 1).unwrap();
        }

        assert_eq!(repo.count_exhausted(3).unwrap(), 1);
        assert_eq!(repo.reset_retries(Some(&first.id)).unwrap(), 1);
        assert_eq!(repo.count_exhausted(3).unwrap(), 0);

        let listed = repo.list().unwrap();
        assert_eq!(listed[0].retries, 0);
        assert_eq!(listed[0].error, None);
    }

    #[test]
    fn test_clear() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        repo.append(&item(SyncAction::Create, "s1")).unwrap();
        repo.append(&item(SyncAction::Delete, "s1")).unwrap();

        assert_eq!(repo.clear().unwrap(), 2);
        assert!(repo.list().unwrap().is_empty());
    }
}

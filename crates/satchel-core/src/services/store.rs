//! Shared handle to the durable offline store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::db::{
    Database, QueueRepository, RecordFilter, RecordRepository, SqliteQueueRepository,
    SqliteRecordRepository, UpsertMode,
};
use crate::models::{Record, RecordData, RecordId, RecordKind, RecordPayload};
use crate::{Error, Result};

/// Thread-safe handle over the local database.
///
/// Every call is synchronous and holds the lock only for the duration of one
/// statement batch, so it is safe to call from async code as long as the
/// returned value is not a guard.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Option<Database>>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or create) the store at the given filesystem path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_ok_and(|guard| guard.is_some())
    }

    /// Close the underlying connection. Later calls fail with `StorageUnavailable`.
    pub fn close(&self) -> Result<()> {
        let db = self.lock()?.take();
        match db {
            Some(db) => {
                db.close()?;
                tracing::debug!("Closed offline store");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Database>>> {
        self.db
            .lock()
            .map_err(|_| Error::StorageUnavailable("offline store lock poisoned".into()))
    }

    /// Run `f` against the open connection.
    pub(crate) fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let guard = self.lock()?;
        let db = guard
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable("offline store is closed".into()))?;
        f(db.connection())
    }

    /// Upsert a local write (last write wins).
    pub fn put<T: RecordData>(&self, record: &Record<T>) -> Result<()> {
        self.with_connection(|conn| {
            SqliteRecordRepository::new(conn).upsert(record, UpsertMode::Overwrite)
        })?;
        tracing::debug!(kind = %T::KIND, id = %record.id, synced = record.synced, "Stored record");
        Ok(())
    }

    /// Store a record pulled from the remote unless a local write is still pending for it.
    ///
    /// Returns whether the row was written.
    pub fn put_remote<T: RecordData>(&self, record: &Record<T>) -> Result<bool> {
        self.with_connection(|conn| {
            SqliteRecordRepository::new(conn).upsert(record, UpsertMode::KeepPending)
        })
    }

    /// Runtime-typed variant of [`Self::put_remote`].
    pub fn put_remote_payload(&self, payload: &RecordPayload) -> Result<bool> {
        match payload {
            RecordPayload::Assignment(record) => self.put_remote(record),
            RecordPayload::Submission(record) => self.put_remote(record),
        }
    }

    pub fn get<T: RecordData>(&self, id: &RecordId) -> Result<Option<Record<T>>> {
        self.with_connection(|conn| SqliteRecordRepository::new(conn).get(id))
    }

    /// Snapshot of one collection.
    pub fn get_all<T: RecordData>(&self, filter: &RecordFilter) -> Result<Vec<Record<T>>> {
        self.with_connection(|conn| SqliteRecordRepository::new(conn).list(filter))
    }

    pub fn delete(&self, kind: RecordKind, id: &RecordId) -> Result<bool> {
        self.with_connection(|conn| SqliteRecordRepository::new(conn).delete(kind, id))
    }

    pub fn count(&self, kind: RecordKind) -> Result<usize> {
        self.with_connection(|conn| SqliteRecordRepository::new(conn).count(kind))
    }

    /// Remove every record of one collection.
    pub fn clear(&self, kind: RecordKind) -> Result<usize> {
        self.with_connection(|conn| SqliteRecordRepository::new(conn).clear(kind))
    }

    /// Remove every record and every queued mutation in one transaction.
    pub fn clear_all(&self) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let records = SqliteRecordRepository::new(&tx);
            for kind in RecordKind::ALL {
                records.clear(kind)?;
            }
            SqliteQueueRepository::new(&tx).clear()?;
            tx.commit()?;
            Ok(())
        })?;
        tracing::info!("Cleared offline store");
        Ok(())
    }

    /// Flag a record as synced if its stored version is still `version`.
    ///
    /// A newer local write made while the push was in flight keeps `synced=false`.
    pub fn mark_synced(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool> {
        self.with_connection(|conn| {
            SqliteRecordRepository::new(conn).mark_synced(kind, id, version)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assignment, QueueItem, Submission, SyncAction};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn submission(id: &str) -> Record<Submission> {
        Record::new(
            id.parse().unwrap(),
            Submission::new("a1", "student-1", serde_json::json!({"q1": "4"})),
        )
    }

    #[test]
    fn test_put_get_delete() {
        let store = LocalStore::open_in_memory().unwrap();
        let record = submission("s1");

        store.put(&record).unwrap();
        assert_eq!(store.get::<Submission>(&record.id).unwrap(), Some(record.clone()));

        assert!(store.delete(RecordKind::Submission, &record.id).unwrap());
        assert_eq!(store.get::<Submission>(&record.id).unwrap(), None);
    }

    #[test]
    fn test_writes_survive_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("satchel.db");

        let store = LocalStore::open(&path).unwrap();
        let record = submission("s1");
        store.put(&record).unwrap();
        store.close().unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        let records = reopened.get_all::<Submission>(&RecordFilter::All).unwrap();
        assert_eq!(records, vec![record]);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn test_closed_store_reports_unavailable() {
        let store = LocalStore::open_in_memory().unwrap();
        let clone = store.clone();
        store.close().unwrap();

        assert!(!clone.is_open());
        let error = clone.put(&submission("s1")).unwrap_err();
        assert!(matches!(error, Error::StorageUnavailable(_)));
        assert!(error.is_storage_failure());
    }

    #[test]
    fn test_put_remote_respects_pending_writes() {
        let store = LocalStore::open_in_memory().unwrap();
        let local = submission("s1");
        store.put(&local).unwrap();

        let mut remote = submission("s1");
        remote.synced = true;
        remote.data.grade = Some(90.0);
        assert!(!store.put_remote_payload(&remote.clone().into_payload()).unwrap());

        store
            .mark_synced(RecordKind::Submission, &local.id, local.last_modified)
            .unwrap();
        assert!(store.put_remote(&remote).unwrap());
        let stored = store.get::<Submission>(&local.id).unwrap().unwrap();
        assert_eq!(stored.data.grade, Some(90.0));
    }

    #[test]
    fn test_clear_all_empties_records_and_queue() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("s1")).unwrap();
        store
            .put(&Record::new("a1".parse().unwrap(), Assignment::new("Quiz", "math")))
            .unwrap();
        store
            .with_connection(|conn| {
                SqliteQueueRepository::new(conn)
                    .append(&QueueItem::new(SyncAction::Create, submission("s1").into_payload()))
            })
            .unwrap();

        store.clear_all().unwrap();

        assert_eq!(store.count(RecordKind::Submission).unwrap(), 0);
        assert_eq!(store.count(RecordKind::Assignment).unwrap(), 0);
        let queued = store
            .with_connection(|conn| SqliteQueueRepository::new(conn).count())
            .unwrap();
        assert_eq!(queued, 0);
    }
}

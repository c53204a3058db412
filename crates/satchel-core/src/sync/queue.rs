//! Durable FIFO of remote-bound mutations.

use crate::db::{
    QueueRepository, RecordRepository, SqliteQueueRepository, SqliteRecordRepository, UpsertMode,
};
use crate::models::{QueueEntryId, QueueItem, Record, RecordData, RecordPayload, SyncAction};
use crate::services::LocalStore;
use crate::util::now_millis;
use crate::{Error, Result};

/// Mutation queue persisted next to the records it refers to.
///
/// Items leave the queue only through [`MutationQueue::remove`] after the
/// remote accepted them. Items that failed `max_retries` times stay queued but
/// are skipped by automatic cycles until [`MutationQueue::reset_retries`].
#[derive(Clone)]
pub struct MutationQueue {
    store: LocalStore,
    max_retries: u32,
}

impl MutationQueue {
    pub const fn new(store: LocalStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Append a mutation behind every pending one
    pub fn enqueue(&self, action: SyncAction, payload: RecordPayload) -> Result<QueueEntryId> {
        let item = QueueItem::new(action, payload);
        self.store
            .with_connection(|conn| SqliteQueueRepository::new(conn).append(&item))?;
        tracing::debug!(
            entry = %item.id,
            kind = %item.kind(),
            record = %item.record_id(),
            action = %item.action,
            "Queued mutation"
        );
        Ok(item.id)
    }

    /// Apply a local write and queue its remote counterpart atomically.
    ///
    /// Either both the record change and the queue entry are committed, or
    /// neither is.
    pub fn enqueue_write<T: RecordData>(
        &self,
        action: SyncAction,
        record: &Record<T>,
    ) -> Result<QueueEntryId> {
        let item = QueueItem::new(action, record.clone().into_payload());
        self.store.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let records = SqliteRecordRepository::new(&tx);
            match action {
                SyncAction::Delete => {
                    records.delete(T::KIND, &record.id)?;
                }
                SyncAction::Create | SyncAction::Update => {
                    records.upsert(record, UpsertMode::Overwrite)?;
                }
            }
            SqliteQueueRepository::new(&tx).append(&item)?;
            tx.commit()?;
            Ok(())
        })?;
        tracing::debug!(
            entry = %item.id,
            kind = %T::KIND,
            record = %record.id,
            action = %action,
            "Stored record and queued mutation"
        );
        Ok(item.id)
    }

    /// FIFO snapshot of every pending item; nothing is removed
    pub fn dequeue_all(&self) -> Result<Vec<QueueItem>> {
        self.store
            .with_connection(|conn| SqliteQueueRepository::new(conn).list())
    }

    /// Drop an item whose remote operation succeeded
    pub fn remove(&self, entry: &QueueEntryId) -> Result<bool> {
        let removed = self
            .store
            .with_connection(|conn| SqliteQueueRepository::new(conn).remove(entry))?;
        if removed {
            tracing::debug!(entry = %entry, "Removed synced mutation");
        }
        Ok(removed)
    }

    /// Count a failed attempt; the item keeps its position.
    ///
    /// Returns `RetryExhausted` as a value (not an error) once the item reaches
    /// the retry ceiling so callers can surface it.
    pub fn requeue_with_error(&self, entry: &QueueEntryId, error: &str) -> Result<Option<Error>> {
        let retries = self.store.with_connection(|conn| {
            SqliteQueueRepository::new(conn).record_failure(entry, error, now_millis())
        })?;

        // Removed concurrently (e.g. by a reset); nothing left to count
        let Some(retries) = retries else {
            tracing::debug!(entry = %entry, "Failed mutation is no longer queued");
            return Ok(None);
        };

        if retries >= self.max_retries {
            tracing::warn!(entry = %entry, retries, "Mutation reached the retry limit: {error}");
            return Ok(Some(Error::RetryExhausted {
                entry: *entry,
                retries,
            }));
        }

        tracing::debug!(entry = %entry, retries, "Mutation failed, will retry: {error}");
        Ok(None)
    }

    pub fn len(&self) -> Result<usize> {
        self.store
            .with_connection(|conn| SqliteQueueRepository::new(conn).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Items automatic cycles gave up on
    pub fn exhausted(&self) -> Result<Vec<QueueItem>> {
        Ok(self
            .dequeue_all()?
            .into_iter()
            .filter(|item| item.is_exhausted(self.max_retries))
            .collect())
    }

    pub fn exhausted_count(&self) -> Result<usize> {
        self.store.with_connection(|conn| {
            SqliteQueueRepository::new(conn).count_exhausted(self.max_retries)
        })
    }

    /// Make exhausted items eligible again; `None` resets every item
    pub fn reset_retries(&self, entry: Option<&QueueEntryId>) -> Result<usize> {
        let reset = self
            .store
            .with_connection(|conn| SqliteQueueRepository::new(conn).reset_retries(entry))?;
        tracing::info!(reset, "Reset mutation retry counters");
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, Submission};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn payload(id: &str) -> RecordPayload {
        Record::new(
            id.parse().unwrap(),
            Submission::new("a1", "student-1", serde_json::json!({})),
        )
        .into_payload()
    }

    fn queue() -> MutationQueue {
        MutationQueue::new(LocalStore::open_in_memory().unwrap(), 3)
    }

    #[test]
    fn enqueue_preserves_insertion_order() {
        let queue = queue();
        let first = queue.enqueue(SyncAction::Create, payload("s1")).unwrap();
        let second = queue.enqueue(SyncAction::Create, payload("s2")).unwrap();
        let third = queue.enqueue(SyncAction::Update, payload("s1")).unwrap();

        let ids = queue
            .dequeue_all()
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![first, second, third]);
        assert_eq!(queue.len().unwrap(), 3);
    }

    #[test]
    fn dequeue_all_does_not_remove() {
        let queue = queue();
        queue.enqueue(SyncAction::Create, payload("s1")).unwrap();

        assert_eq!(queue.dequeue_all().unwrap().len(), 1);
        assert_eq!(queue.dequeue_all().unwrap().len(), 1);
    }

    #[test]
    fn requeue_keeps_position_and_counts_retries() {
        let queue = queue();
        let first = queue.enqueue(SyncAction::Create, payload("s1")).unwrap();
        queue.enqueue(SyncAction::Create, payload("s2")).unwrap();

        assert!(queue.requeue_with_error(&first, "HTTP 500").unwrap().is_none());

        let items = queue.dequeue_all().unwrap();
        assert_eq!(items[0].id, first);
        assert_eq!(items[0].retries, 1);
        assert_eq!(items[0].error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn exhausted_items_are_retained_and_flagged() {
        let queue = queue();
        let entry = queue.enqueue(SyncAction::Create, payload("s1")).unwrap();

        assert!(queue.requeue_with_error(&entry, "boom").unwrap().is_none());
        assert!(queue.requeue_with_error(&entry, "boom").unwrap().is_none());
        let exhausted = queue.requeue_with_error(&entry, "boom").unwrap();
        assert!(matches!(
            exhausted,
            Some(Error::RetryExhausted { retries: 3, .. })
        ));

        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(queue.exhausted_count().unwrap(), 1);
        assert_eq!(queue.exhausted().unwrap()[0].id, entry);

        queue.reset_retries(None).unwrap();
        assert_eq!(queue.exhausted_count().unwrap(), 0);
    }

    #[test]
    fn requeue_of_removed_item_is_ignored() {
        let queue = queue();
        let entry = queue.enqueue(SyncAction::Create, payload("s1")).unwrap();
        assert!(queue.remove(&entry).unwrap());

        assert!(queue.requeue_with_error(&entry, "late failure").unwrap().is_none());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn queue_survives_restart() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("satchel.db");

        let store = LocalStore::open(&path).unwrap();
        let entry = MutationQueue::new(store.clone(), 3)
            .enqueue(SyncAction::Delete, payload("s1"))
            .unwrap();
        store.close().unwrap();

        let reopened = MutationQueue::new(LocalStore::open(&path).unwrap(), 3);
        let items = reopened.dequeue_all().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, entry);
        assert_eq!(items[0].action, SyncAction::Delete);
    }
}

//! Offline-aware write path used by application code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::store::LocalStore;
use crate::models::{QueueEntryId, Record, RecordData, RecordId, SyncAction};
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::{ConnectivityMonitor, MutationQueue, SyncOrchestrator, SyncOutcome};
use crate::util::now_millis;
use crate::{Error, Result};

/// Where a write ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Stored locally and queued for the remote
    Queued,
    /// Local storage is unavailable; written straight to the remote
    Direct,
}

#[derive(Debug)]
pub struct WriteReceipt<T> {
    pub record: Record<T>,
    pub mode: WriteMode,
    /// Queue entry carrying the remote write, for queued writes
    pub entry: Option<QueueEntryId>,
    /// Sync cycle started right after the write when online
    pub sync: Option<JoinHandle<Result<SyncOutcome>>>,
}

/// Write-through to the local store, enqueue always, then drain if online.
///
/// The first storage failure switches the writer to online-only mode for the
/// rest of the session.
#[derive(Clone)]
pub struct OfflineWriter {
    store: LocalStore,
    queue: MutationQueue,
    orchestrator: Arc<SyncOrchestrator>,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    operation_timeout: Duration,
    storage_disabled: Arc<AtomicBool>,
}

impl OfflineWriter {
    pub fn new(
        store: LocalStore,
        orchestrator: Arc<SyncOrchestrator>,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            queue: orchestrator.queue().clone(),
            store,
            orchestrator,
            remote,
            monitor,
            operation_timeout,
            storage_disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether writes still go through the local store
    pub fn is_offline_storage_enabled(&self) -> bool {
        !self.storage_disabled.load(Ordering::Acquire)
    }

    /// Write a record.
    ///
    /// `Create` without an id mints one and flags the record as created
    /// offline. `Update` and `Delete` require an id.
    pub async fn write<T: RecordData>(
        &self,
        action: SyncAction,
        id: Option<RecordId>,
        data: T,
    ) -> Result<WriteReceipt<T>> {
        let (id, minted) = match (id, action) {
            (Some(id), _) => (id, false),
            (None, SyncAction::Create) => (RecordId::mint(), true),
            (None, _) => {
                return Err(Error::InvalidInput(format!(
                    "{action} of a {} requires a record id",
                    T::KIND
                )));
            }
        };
        let mut record = Record::new(id, data);
        record.offline_created = minted;

        if self.is_offline_storage_enabled() {
            match self.write_local(action, &mut record) {
                Ok(entry) => {
                    if let Err(error) = self.orchestrator.refresh_counts() {
                        tracing::warn!("Failed to refresh queue counters: {error}");
                    }
                    let sync = self.monitor.is_online().then(|| {
                        let orchestrator = Arc::clone(&self.orchestrator);
                        tokio::spawn(async move { orchestrator.sync().await })
                    });
                    return Ok(WriteReceipt {
                        record,
                        mode: WriteMode::Queued,
                        entry: Some(entry),
                        sync,
                    });
                }
                Err(error) if error.is_storage_failure() => {
                    tracing::warn!("Offline storage failed, switching to online-only writes: {error}");
                    self.storage_disabled.store(true, Ordering::Release);
                }
                Err(error) => return Err(error),
            }
        }

        self.write_direct(action, record).await
    }

    /// Delete a record that exists in the local store
    pub async fn delete<T: RecordData>(&self, id: RecordId) -> Result<WriteReceipt<T>> {
        let existing = self
            .store
            .get::<T>(&id)?
            .ok_or_else(|| Error::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
        self.write(SyncAction::Delete, Some(id), existing.data).await
    }

    fn write_local<T: RecordData>(
        &self,
        action: SyncAction,
        record: &mut Record<T>,
    ) -> Result<QueueEntryId> {
        if let Some(existing) = self.store.get::<T>(&record.id)? {
            record.offline_created |= existing.offline_created;
            // Keep versions strictly increasing so an older push cannot mark this one synced
            record.last_modified = record.last_modified.max(existing.last_modified + 1);
        }

        self.queue.enqueue_write(action, record)
    }

    async fn write_direct<T: RecordData>(
        &self,
        action: SyncAction,
        mut record: Record<T>,
    ) -> Result<WriteReceipt<T>> {
        if !self.monitor.is_online() {
            return Err(Error::StorageUnavailable(
                "offline storage is disabled and the remote is unreachable".into(),
            ));
        }

        record.synced = true;
        record.last_modified = now_millis();
        let payload = record.clone().into_payload();
        let call = async {
            match action {
                SyncAction::Create => self.remote.insert(&payload).await,
                SyncAction::Update => self.remote.update_by_id(&payload).await,
                SyncAction::Delete => self.remote.delete_by_id(T::KIND, &record.id).await,
            }
        };
        tokio::time::timeout(self.operation_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
            .map_err(|error| Error::RemoteWriteFailed {
                kind: T::KIND,
                action: action.to_string(),
                record_id: record.id.to_string(),
                message: error.to_string(),
            })?;

        tracing::debug!(kind = %T::KIND, id = %record.id, "Wrote record directly to remote");
        Ok(WriteReceipt {
            record,
            mode: WriteMode::Direct,
            entry: None,
            sync: None,
        })
    }
}

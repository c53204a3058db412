//! Engine facade wiring store, queue, connectivity, orchestrator and writer.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::LocalStore;
use super::writer::{OfflineWriter, WriteReceipt};
use crate::config::EngineConfig;
use crate::db::RecordFilter;
use crate::models::{Assignment, QueueItem, Record, RecordData, RecordId, Submission, SyncAction};
use crate::remote::RemoteStore;
use crate::sync::{
    spawn_heartbeat, Connectivity, ConnectivityMonitor, MutationQueue, SyncOrchestrator,
    SyncOutcome, SyncStatus,
};
use crate::{Error, Result};

/// Offline-first sync engine.
///
/// Owns the background tasks it spawns; [`SyncEngine::close`] stops them and
/// closes the store.
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    orchestrator: Arc<SyncOrchestrator>,
    writer: OfflineWriter,
    config: EngineConfig,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Wire the engine around an opened store. Must be called inside a Tokio runtime.
    pub fn init(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        config: EngineConfig,
        initial: Connectivity,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::Config("the sync engine needs a Tokio runtime".into()))?;

        let monitor = ConnectivityMonitor::new(initial, config.reconnect_debounce());
        let queue = MutationQueue::new(store.clone(), config.max_retries);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            queue,
            Arc::clone(&remote),
            monitor.clone(),
            config.clone(),
        ));
        let writer = OfflineWriter::new(
            store.clone(),
            Arc::clone(&orchestrator),
            Arc::clone(&remote),
            monitor.clone(),
            config.operation_timeout(),
        );

        // Weak handles: the monitor outlives neither the orchestrator nor the engine
        let weak = Arc::downgrade(&orchestrator);
        let spawner = runtime.clone();
        monitor.on_reconnect(move || {
            let weak = weak.clone();
            spawner.spawn(async move { run_triggered(&weak, "reconnect").await });
        });

        let online_task = runtime.spawn(forward_connectivity(
            monitor.subscribe(),
            Arc::downgrade(&orchestrator),
        ));

        tracing::info!(online = initial.is_online(), "Sync engine initialised");
        Ok(Self {
            store,
            remote,
            monitor,
            orchestrator,
            writer,
            config,
            runtime,
            tasks: Mutex::new(vec![online_task]),
        })
    }

    /// App-start trigger: publish counters, start the periodic timer, sync if online
    pub async fn start(&self) -> Result<SyncOutcome> {
        self.orchestrator.refresh_counts()?;

        if let Some(interval) = self.config.sync_interval() {
            let weak = Arc::downgrade(&self.orchestrator);
            let task = self.runtime.spawn(async move {
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if weak.strong_count() == 0 {
                        break;
                    }
                    run_triggered(&weak, "timer").await;
                }
            });
            self.track(task);
            tracing::debug!(?interval, "Periodic sync enabled");
        }

        self.orchestrator.sync().await
    }

    /// Ping the remote every `interval` to drive connectivity
    pub fn start_heartbeat(&self, interval: Duration) {
        let task = spawn_heartbeat(
            self.monitor.clone(),
            Arc::clone(&self.remote),
            interval,
            self.config.operation_timeout(),
        );
        self.track(task);
    }

    /// Feed an environment connectivity signal
    pub fn report_connectivity(&self, connectivity: Connectivity) -> bool {
        self.monitor.report(connectivity)
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub const fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub const fn writer(&self) -> &OfflineWriter {
        &self.writer
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub async fn force_sync(&self) -> Result<SyncOutcome> {
        self.orchestrator.sync().await
    }

    /// Manual retry of mutations that reached the retry limit
    pub async fn retry_failed(&self) -> Result<SyncOutcome> {
        self.orchestrator.retry_failed().await
    }

    pub fn status(&self) -> SyncStatus {
        self.orchestrator.status()
    }

    /// Recount the queue and return the published status
    pub fn refresh_status(&self) -> Result<SyncStatus> {
        self.orchestrator.refresh_counts()?;
        Ok(self.orchestrator.status())
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.orchestrator.subscribe()
    }

    pub async fn write<T: RecordData>(
        &self,
        action: SyncAction,
        id: Option<RecordId>,
        data: T,
    ) -> Result<WriteReceipt<T>> {
        self.writer.write(action, id, data).await
    }

    pub async fn delete<T: RecordData>(&self, id: RecordId) -> Result<WriteReceipt<T>> {
        self.writer.delete(id).await
    }

    /// Assignments available offline
    pub fn assignments(&self, filter: &RecordFilter) -> Result<Vec<Record<Assignment>>> {
        self.store.get_all(filter)
    }

    /// Submissions available offline
    pub fn submissions(&self, filter: &RecordFilter) -> Result<Vec<Record<Submission>>> {
        self.store.get_all(filter)
    }

    pub fn pending_mutations(&self) -> Result<Vec<QueueItem>> {
        self.orchestrator.queue().dequeue_all()
    }

    /// Drop every local record and queued mutation (sign-out)
    pub fn reset(&self) -> Result<()> {
        self.store.clear_all()?;
        self.orchestrator.refresh_counts()
    }

    /// Stop background tasks and close the store
    pub fn close(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.store.close()?;
        tracing::info!("Sync engine closed");
        Ok(())
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

async fn run_triggered(orchestrator: &Weak<SyncOrchestrator>, trigger: &str) {
    let Some(orchestrator) = orchestrator.upgrade() else {
        return;
    };
    match orchestrator.sync().await {
        Ok(SyncOutcome::Completed(report)) => {
            tracing::debug!(trigger, pushed = report.pushed, "Triggered sync finished");
        }
        Ok(outcome) => tracing::debug!(trigger, ?outcome, "Triggered sync not run"),
        Err(error) => tracing::warn!(trigger, "Triggered sync failed: {error}"),
    }
}

async fn forward_connectivity(
    mut receiver: watch::Receiver<Connectivity>,
    orchestrator: Weak<SyncOrchestrator>,
) {
    loop {
        let online = receiver.borrow_and_update().is_online();
        match orchestrator.upgrade() {
            Some(orchestrator) => orchestrator.set_online(online),
            None => break,
        }
        if receiver.changed().await.is_err() {
            break;
        }
    }
}

//! Pull-then-push reconciliation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use super::connectivity::ConnectivityMonitor;
use super::queue::MutationQueue;
use super::status::{progress_percent, SyncOutcome, SyncPhase, SyncReport, SyncStatus};
use crate::config::EngineConfig;
use crate::models::{QueueItem, RecordKind, SyncAction};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::services::LocalStore;
use crate::{Error, Result};

/// Clears the in-flight flag when a cycle ends, including on early return
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct QueueCounts {
    pending: usize,
    exhausted: usize,
}

/// Drives sync cycles and publishes [`SyncStatus`].
///
/// At most one cycle runs at a time; a trigger that arrives while a cycle is
/// in flight returns [`SyncOutcome::Skipped`]. Per-item and per-type failures
/// are recorded and never abort the cycle. Storage failures do.
pub struct SyncOrchestrator {
    store: LocalStore,
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    config: EngineConfig,
    in_flight: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

impl SyncOrchestrator {
    pub fn new(
        store: LocalStore,
        queue: MutationQueue,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
        config: EngineConfig,
    ) -> Self {
        let initial = SyncStatus {
            is_online: monitor.is_online(),
            ..SyncStatus::default()
        };
        let (status, _) = watch::channel(initial);
        Self {
            store,
            queue,
            remote,
            monitor,
            config,
            in_flight: AtomicBool::new(false),
            status,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub const fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.status.send_if_modified(|status| {
            let changed = status.is_online != online;
            status.is_online = online;
            changed
        });
    }

    /// Re-read queue counters into the published status
    pub fn refresh_counts(&self) -> Result<()> {
        let counts = self.queue_counts()?;
        self.publish_counts(counts);
        Ok(())
    }

    /// Run one cycle unless offline or another cycle is in flight
    pub async fn sync(&self) -> Result<SyncOutcome> {
        if !self.monitor.is_online() {
            tracing::debug!("Sync requested while offline");
            return Ok(SyncOutcome::Offline);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already in progress, trigger dropped");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = CycleGuard(&self.in_flight);

        self.status.send_modify(|status| {
            status.is_syncing = true;
            status.phase = SyncPhase::Syncing;
            status.sync_progress = 0;
            status.errors.clear();
        });

        match self.run_cycle().await {
            Ok((report, counts)) => {
                self.finish(&report, counts);
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                tracing::error!("Sync cycle aborted: {error}");
                self.status.send_modify(|status| {
                    status.is_syncing = false;
                    status.phase = SyncPhase::ErrorReported;
                    status.errors.push(error.to_string());
                });
                Err(error)
            }
        }
    }

    /// Make exhausted mutations eligible again and sync
    pub async fn retry_failed(&self) -> Result<SyncOutcome> {
        self.queue.reset_retries(None)?;
        self.refresh_counts()?;
        self.sync().await
    }

    async fn run_cycle(&self) -> Result<(SyncReport, QueueCounts)> {
        let mut report = SyncReport::default();
        self.pull(&mut report).await?;
        self.push(&mut report).await?;
        let counts = self.queue_counts()?;
        Ok((report, counts))
    }

    async fn pull(&self, report: &mut SyncReport) -> Result<()> {
        // Rows with a queued mutation are newer locally, including pending deletes
        let pending = self
            .queue
            .dequeue_all()?
            .iter()
            .map(|item| (item.kind(), item.record_id().clone()))
            .collect::<HashSet<_>>();

        for kind in RecordKind::ALL {
            let owner = match kind {
                RecordKind::Assignment => None,
                RecordKind::Submission => {
                    let Some(owner) = self.config.owner_id.as_deref() else {
                        tracing::debug!("No student configured, skipping submission pull");
                        continue;
                    };
                    Some(owner)
                }
            };

            let rows = match self.bounded(self.remote.fetch_all(kind, owner)).await {
                Ok(rows) => rows,
                Err(error) => {
                    let failure = Error::RemotePullFailed {
                        kind,
                        message: error.to_string(),
                    };
                    tracing::warn!("{failure}");
                    report.errors.push(failure.to_string());
                    continue;
                }
            };

            let mut applied = 0;
            for row in rows.into_iter().filter(|row| row.kind() == kind) {
                if pending.contains(&(kind, row.id().clone())) {
                    report.kept_pending += 1;
                    continue;
                }
                if self.store.put_remote_payload(&row.with_synced(true))? {
                    applied += 1;
                } else {
                    report.kept_pending += 1;
                }
            }
            report.add_pulled(kind, applied);
            tracing::debug!(kind = %kind, applied, "Pulled remote records");
        }
        Ok(())
    }

    async fn push(&self, report: &mut SyncReport) -> Result<()> {
        let max_retries = self.queue.max_retries();
        let (eligible, exhausted): (Vec<_>, Vec<_>) = self
            .queue
            .dequeue_all()?
            .into_iter()
            .partition(|item| !item.is_exhausted(max_retries));
        report.skipped_exhausted = exhausted.len();

        let total = eligible.len();
        for (index, item) in eligible.iter().enumerate() {
            match self.bounded(self.apply(item)).await {
                Ok(()) => {
                    self.queue.remove(&item.id)?;
                    if item.action != SyncAction::Delete {
                        self.store.mark_synced(
                            item.kind(),
                            item.record_id(),
                            item.payload.last_modified(),
                        )?;
                    }
                    report.pushed += 1;
                }
                Err(error) => {
                    let failure = Error::RemoteWriteFailed {
                        kind: item.kind(),
                        action: item.action.to_string(),
                        record_id: item.record_id().to_string(),
                        message: error.to_string(),
                    };
                    tracing::warn!("{failure}");
                    self.queue.requeue_with_error(&item.id, &error.to_string())?;
                    report.failed += 1;
                    report.errors.push(failure.to_string());
                }
            }

            let progress = progress_percent(index + 1, total);
            self.status.send_modify(|status| {
                status.sync_progress = status.sync_progress.max(progress);
            });
        }
        Ok(())
    }

    async fn apply(&self, item: &QueueItem) -> RemoteResult<()> {
        match item.action {
            SyncAction::Create => self.remote.insert(&item.payload).await,
            SyncAction::Update => self.remote.update_by_id(&item.payload).await,
            SyncAction::Delete => {
                self.remote
                    .delete_by_id(item.kind(), item.record_id())
                    .await
            }
        }
    }

    /// Bound a remote call by the configured operation timeout
    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.config.operation_timeout(), call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    fn queue_counts(&self) -> Result<QueueCounts> {
        Ok(QueueCounts {
            pending: self.queue.len()?,
            exhausted: self.queue.exhausted_count()?,
        })
    }

    fn publish_counts(&self, counts: QueueCounts) {
        self.status.send_if_modified(|status| {
            let changed = status.pending_items != counts.pending
                || status.exhausted_items != counts.exhausted;
            status.pending_items = counts.pending;
            status.exhausted_items = counts.exhausted;
            changed
        });
    }

    fn finish(&self, report: &SyncReport, counts: QueueCounts) {
        self.status.send_modify(|status| {
            status.is_syncing = false;
            status.sync_progress = 100;
            status.pending_items = counts.pending;
            status.exhausted_items = counts.exhausted;
            status.last_sync_time = Some(Utc::now());
            status.cycles += 1;
            status.errors.clone_from(&report.errors);
            if let Some(warning) = status.exhausted_warning() {
                status.errors.push(warning);
            }
            status.phase = if status.errors.is_empty() {
                SyncPhase::Idle
            } else {
                SyncPhase::ErrorReported
            };
        });

        tracing::info!(
            pulled = report.pulled(),
            pushed = report.pushed,
            failed = report.failed,
            pending = counts.pending,
            exhausted = counts.exhausted,
            "Sync cycle finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordFilter;
    use crate::models::{Assignment, Record, RecordId, Submission};
    use crate::remote::{MemoryRemote, RemoteOp};
    use crate::sync::Connectivity;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        orchestrator: Arc<SyncOrchestrator>,
        store: LocalStore,
        queue: MutationQueue,
        remote: MemoryRemote,
        monitor: ConnectivityMonitor,
    }

    fn harness_with(config: EngineConfig, remote: MemoryRemote) -> Harness {
        let store = LocalStore::open_in_memory().unwrap();
        let queue = MutationQueue::new(store.clone(), config.max_retries);
        let monitor = ConnectivityMonitor::new(Connectivity::Online, Duration::ZERO);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            queue.clone(),
            Arc::new(remote.clone()),
            monitor.clone(),
            config,
        ));
        Harness {
            orchestrator,
            store,
            queue,
            remote,
            monitor,
        }
    }

    fn harness() -> Harness {
        harness_with(
            EngineConfig::default().with_owner("student-1"),
            MemoryRemote::new(),
        )
    }

    fn id(value: &str) -> RecordId {
        value.parse().unwrap()
    }

    /// Write a submission locally and queue its create, as the write path does
    fn write_offline_submission(harness: &Harness, record_id: &str) -> Record<Submission> {
        let mut record = Record::new(
            id(record_id),
            Submission::new("a1", "student-1", serde_json::json!({"q1": record_id})),
        );
        record.offline_created = true;
        harness.store.put(&record).unwrap();
        harness
            .queue
            .enqueue(SyncAction::Create, record.clone().into_payload())
            .unwrap();
        record
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_submission_round_trips_under_same_id() {
        let harness = harness();
        harness.monitor.report(Connectivity::Offline);
        write_offline_submission(&harness, "s1");

        assert_eq!(
            harness.orchestrator.sync().await.unwrap(),
            SyncOutcome::Offline
        );
        assert!(harness.remote.calls().is_empty());

        harness.monitor.report(Connectivity::Online);
        let report = completed(harness.orchestrator.sync().await.unwrap());

        assert_eq!(report.pushed, 1);
        assert!(harness.queue.is_empty().unwrap());
        let local = harness.store.get::<Submission>(&id("s1")).unwrap().unwrap();
        assert!(local.synced);
        assert!(local.offline_created);

        let inserts = harness
            .remote
            .calls()
            .into_iter()
            .filter(|call| call.op == RemoteOp::Insert)
            .collect::<Vec<_>>();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].id, Some(id("s1")));
        assert!(harness.remote.row(RecordKind::Submission, &id("s1")).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failing_item_does_not_block_the_others() {
        let harness = harness();
        for n in 1..=5 {
            write_offline_submission(&harness, &format!("s{n}"));
        }
        harness.remote.fail_next(RemoteOp::Insert, Some(&id("s2")));

        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.pushed, 4);
        assert_eq!(report.failed, 1);

        let remaining = harness.queue.dequeue_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id(), &id("s2"));
        assert_eq!(remaining[0].retries, 1);
        assert!(remaining[0].error.is_some());

        assert_eq!(harness.remote.rows(RecordKind::Submission).len(), 4);
        let status = harness.orchestrator.status();
        assert_eq!(status.phase, SyncPhase::ErrorReported);
        assert_eq!(status.pending_items, 1);
        assert!(status.errors[0].contains("s2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_triggers_run_a_single_cycle() {
        let harness = harness_with(
            EngineConfig::default(),
            MemoryRemote::new().with_latency(Duration::from_millis(50)),
        );
        write_offline_submission(&harness, "s1");

        let (first, second) = tokio::join!(
            harness.orchestrator.sync(),
            harness.orchestrator.sync()
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        let skipped = outcomes
            .iter()
            .filter(|outcome| **outcome == SyncOutcome::Skipped)
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(harness.remote.call_count(RemoteOp::Insert), 1);
        assert_eq!(harness.orchestrator.status().cycles, 1);
        assert!(!harness.orchestrator.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_update_is_retried_on_next_cycle() {
        let harness = harness();
        let mut a1 = Record::new(id("a1"), Assignment::new("Fractions", "math"));
        harness.remote.seed(a1.clone().into_payload());

        a1.data.title = "Fractions (revised)".into();
        a1.last_modified += 1;
        harness.store.put(&a1).unwrap();
        harness
            .queue
            .enqueue(SyncAction::Update, a1.clone().into_payload())
            .unwrap();
        harness.remote.fail_next(RemoteOp::Update, Some(&id("a1")));

        harness.orchestrator.sync().await.unwrap();
        let queued = harness.queue.dequeue_all().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].retries, 1);
        assert!(!harness.store.get::<Assignment>(&id("a1")).unwrap().unwrap().synced);

        harness.orchestrator.sync().await.unwrap();
        assert!(harness.queue.is_empty().unwrap());
        let local = harness.store.get::<Assignment>(&id("a1")).unwrap().unwrap();
        assert!(local.synced);
        assert_eq!(local.data.title, "Fractions (revised)");
        assert_eq!(harness.orchestrator.status().phase, SyncPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_stores_remote_rows_as_synced() {
        let harness = harness();
        harness
            .remote
            .seed(Record::new(id("a1"), Assignment::new("Essay", "english")).into_payload());
        harness.remote.seed(
            Record::new(id("s1"), Submission::new("a1", "student-1", serde_json::json!({})))
                .into_payload(),
        );
        harness.remote.seed(
            Record::new(id("s2"), Submission::new("a1", "student-2", serde_json::json!({})))
                .into_payload(),
        );

        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.pulled_assignments, 1);
        assert_eq!(report.pulled_submissions, 1);

        let assignments = harness
            .store
            .get_all::<Assignment>(&RecordFilter::All)
            .unwrap();
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].synced);
        assert!(harness.store.get::<Submission>(&id("s2")).unwrap().is_none());
        assert!(harness.queue.is_empty().unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_does_not_clobber_pending_local_writes() {
        let harness = harness();
        let remote_copy =
            Record::new(id("s1"), Submission::new("a1", "student-1", serde_json::json!("old")));
        harness.remote.seed(remote_copy.into_payload());

        let mut local = Record::new(
            id("s1"),
            Submission::new("a1", "student-1", serde_json::json!("new")),
        );
        local.last_modified += 10;
        harness.store.put(&local).unwrap();
        harness
            .queue
            .enqueue(SyncAction::Update, local.clone().into_payload())
            .unwrap();

        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.kept_pending, 1);
        assert_eq!(report.pushed, 1);

        let stored = harness.store.get::<Submission>(&id("s1")).unwrap().unwrap();
        assert_eq!(stored.data.answers, serde_json::json!("new"));
        assert!(stored.synced);
        match harness.remote.row(RecordKind::Submission, &id("s1")).unwrap() {
            crate::models::RecordPayload::Submission(record) => {
                assert_eq!(record.data.answers, serde_json::json!("new"));
            }
            crate::models::RecordPayload::Assignment(_) => panic!("wrong kind"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_failure_is_isolated_per_type() {
        let harness = harness();
        harness.remote.seed(
            Record::new(id("s1"), Submission::new("a1", "student-1", serde_json::json!({})))
                .into_payload(),
        );
        // The assignment pull runs first and takes the injected failure
        harness.remote.fail_next(RemoteOp::FetchAll, None);
        write_offline_submission(&harness, "s2");

        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.pulled_submissions, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Failed to pull assignment records"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_items_are_skipped_until_retried() {
        let config = EngineConfig {
            max_retries: 1,
            ..EngineConfig::default()
        };
        let harness = harness_with(config, MemoryRemote::new());
        write_offline_submission(&harness, "s1");
        harness.remote.fail_next(RemoteOp::Insert, None);

        harness.orchestrator.sync().await.unwrap();
        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.skipped_exhausted, 1);
        assert_eq!(harness.remote.call_count(RemoteOp::Insert), 1);

        let status = harness.orchestrator.status();
        assert_eq!(status.exhausted_items, 1);
        assert_eq!(status.pending_items, 1);
        assert!(status.errors.contains(&"1 item failed to sync".to_string()));
        assert_eq!(status.phase, SyncPhase::ErrorReported);

        let retried = completed(harness.orchestrator.retry_failed().await.unwrap());
        assert_eq!(retried.pushed, 1);
        assert!(harness.queue.is_empty().unwrap());
        assert_eq!(harness.orchestrator.status().exhausted_items, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_replayed_remotely() {
        let harness = harness();
        let record = Record::new(id("s1"), Submission::new("a1", "student-1", serde_json::json!({})));
        harness.remote.seed(record.clone().into_payload());
        harness
            .queue
            .enqueue(SyncAction::Delete, record.into_payload())
            .unwrap();

        let report = completed(harness.orchestrator.sync().await.unwrap());
        assert_eq!(report.pushed, 1);
        assert_eq!(report.kept_pending, 1);
        assert!(harness.store.get::<Submission>(&id("s1")).unwrap().is_none());
        assert!(harness.remote.row(RecordKind::Submission, &id("s1")).is_none());
        assert_eq!(harness.remote.call_count(RemoteOp::Delete), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completed_cycle_reports_full_progress() {
        let harness = harness();
        write_offline_submission(&harness, "s1");
        write_offline_submission(&harness, "s2");

        harness.orchestrator.sync().await.unwrap();
        let status = harness.orchestrator.status();
        assert_eq!(status.sync_progress, 100);
        assert!(!status.is_syncing);
        assert!(status.last_sync_time.is_some());
        assert_eq!(status.cycles, 1);
        assert_eq!(status.pending_items, 0);
    }
}

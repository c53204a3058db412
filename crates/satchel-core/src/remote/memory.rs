//! In-process remote store with call logging and failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteError, RemoteOp, RemoteResult, RemoteStore};
use crate::models::{RecordId, RecordKind, RecordPayload};

/// One call observed by a [`MemoryRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub kind: Option<RecordKind>,
    pub id: Option<RecordId>,
}

#[derive(Debug)]
struct InjectedFailure {
    op: RemoteOp,
    id: Option<RecordId>,
    remaining: u32,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    rows: HashMap<RecordKind, BTreeMap<RecordId, RecordPayload>>,
    calls: Vec<RemoteCall>,
    failures: Vec<InjectedFailure>,
    unreachable: bool,
}

/// Deterministic [`RemoteStore`] kept entirely in memory.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
    latency: Duration,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a row as if another client had written it
    pub fn seed(&self, payload: RecordPayload) {
        let payload = payload.with_synced(true);
        self.state()
            .rows
            .entry(payload.kind())
            .or_default()
            .insert(payload.id().clone(), payload);
    }

    /// Fail the next matching call; `id = None` matches any record
    pub fn fail_next(&self, op: RemoteOp, id: Option<&RecordId>) {
        self.fail_times(op, id, 1);
    }

    /// Fail the next `times` matching calls
    pub fn fail_times(&self, op: RemoteOp, id: Option<&RecordId>, times: u32) {
        if times == 0 {
            return;
        }
        self.state().failures.push(InjectedFailure {
            op,
            id: id.cloned(),
            remaining: times,
            message: format!("injected {op} failure"),
        });
    }

    /// Simulate a network partition
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    /// Number of logged calls of one kind
    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.state().calls.iter().filter(|call| call.op == op).count()
    }

    pub fn rows(&self, kind: RecordKind) -> Vec<RecordPayload> {
        self.state()
            .rows
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, kind: RecordKind, id: &RecordId) -> Option<RecordPayload> {
        self.state()
            .rows
            .get(&kind)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    async fn enter(
        &self,
        op: RemoteOp,
        kind: Option<RecordKind>,
        id: Option<&RecordId>,
    ) -> RemoteResult<()> {
        self.state().calls.push(RemoteCall {
            op,
            kind,
            id: id.cloned(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state();
        if state.unreachable {
            return Err(RemoteError::Unavailable("memory remote is offline".into()));
        }

        let matching = state
            .failures
            .iter()
            .position(|failure| failure.op == op && (failure.id.is_none() || failure.id.as_ref() == id));
        if let Some(index) = matching {
            let failure = &mut state.failures[index];
            failure.remaining = failure.remaining.saturating_sub(1);
            let message = failure.message.clone();
            if failure.remaining == 0 {
                state.failures.remove(index);
            }
            return Err(RemoteError::Api {
                status: 500,
                message,
            });
        }

        Ok(())
    }
}

fn owned_by(payload: &RecordPayload, owner: &str) -> bool {
    match payload {
        RecordPayload::Submission(record) => record.data.student_id == owner,
        RecordPayload::Assignment(_) => true,
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_all(
        &self,
        kind: RecordKind,
        owner: Option<&str>,
    ) -> RemoteResult<Vec<RecordPayload>> {
        self.enter(RemoteOp::FetchAll, Some(kind), None).await?;

        let rows = self
            .rows(kind)
            .into_iter()
            .filter(|payload| match owner {
                Some(owner) => owned_by(payload, owner),
                None => true,
            })
            .collect();
        Ok(rows)
    }

    async fn insert(&self, payload: &RecordPayload) -> RemoteResult<()> {
        self.enter(RemoteOp::Insert, Some(payload.kind()), Some(payload.id()))
            .await?;
        self.seed(payload.clone());
        Ok(())
    }

    async fn update_by_id(&self, payload: &RecordPayload) -> RemoteResult<()> {
        self.enter(RemoteOp::Update, Some(payload.kind()), Some(payload.id()))
            .await?;

        if self.row(payload.kind(), payload.id()).is_none() {
            return Err(RemoteError::Rejected(format!(
                "{} {} does not exist",
                payload.kind(),
                payload.id()
            )));
        }
        self.seed(payload.clone());
        Ok(())
    }

    async fn delete_by_id(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<()> {
        self.enter(RemoteOp::Delete, Some(kind), Some(id)).await?;

        if let Some(rows) = self.state().rows.get_mut(&kind) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.enter(RemoteOp::Ping, None, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assignment, Record, Submission};
    use pretty_assertions::assert_eq;

    fn submission(id: &str, student: &str) -> RecordPayload {
        Record::new(
            id.parse().unwrap(),
            Submission::new("a1", student, serde_json::json!({})),
        )
        .into_payload()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_is_an_upsert_by_id() {
        let remote = MemoryRemote::new();
        remote.insert(&submission("s1", "student-1")).await.unwrap();
        remote.insert(&submission("s1", "student-1")).await.unwrap();

        assert_eq!(remote.rows(RecordKind::Submission).len(), 1);
        assert_eq!(remote.call_count(RemoteOp::Insert), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_all_filters_submissions_by_owner() {
        let remote = MemoryRemote::new();
        remote.seed(submission("s1", "student-1"));
        remote.seed(submission("s2", "student-2"));
        remote.seed(Record::new("a1".parse().unwrap(), Assignment::new("Quiz", "math")).into_payload());

        let mine = remote
            .fetch_all(RecordKind::Submission, Some("student-1"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id().as_str(), "s1");
        assert!(mine[0].is_synced());

        let assignments = remote
            .fetch_all(RecordKind::Assignment, Some("student-1"))
            .await
            .unwrap();
        assert_eq!(assignments.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn injected_failure_fires_once_for_matching_id() {
        let remote = MemoryRemote::new();
        let s1: RecordId = "s1".parse().unwrap();
        remote.fail_next(RemoteOp::Insert, Some(&s1));

        remote.insert(&submission("s2", "student-1")).await.unwrap();
        let error = remote.insert(&submission("s1", "student-1")).await.unwrap_err();
        assert!(matches!(error, RemoteError::Api { status: 500, .. }));
        remote.insert(&submission("s1", "student-1")).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_of_missing_row_is_rejected() {
        let remote = MemoryRemote::new();
        let error = remote
            .update_by_id(&submission("s1", "student-1"))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Rejected(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_remote_fails_every_call() {
        let remote = MemoryRemote::new();
        remote.set_reachable(false);
        assert!(matches!(remote.ping().await, Err(RemoteError::Unavailable(_))));

        remote.set_reachable(true);
        remote.ping().await.unwrap();
    }
}

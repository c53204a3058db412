use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use satchel_core::{
    Assignment, Connectivity, EngineConfig, IndexField, LocalStore, MemoryRemote, PostgrestRemote,
    QueueItem, Record, RecordFilter, RecordId, RemoteStore, Submission, SyncEngine, WriteMode,
    WriteReceipt,
};
use serde::Serialize;

use crate::config::CliConfig;
use crate::error::CliError;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// An engine opened for one CLI invocation
pub struct Session {
    pub engine: SyncEngine,
    pub remote_configured: bool,
    pub offline_flag: bool,
}

impl Session {
    /// Wire a session around an already chosen remote
    pub fn from_parts(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        engine_config: EngineConfig,
        initial: Connectivity,
    ) -> Result<Self, CliError> {
        Ok(Self {
            engine: SyncEngine::init(store, remote, engine_config, initial)?,
            remote_configured: true,
            offline_flag: false,
        })
    }

    /// Fail unless this session can talk to a configured remote
    pub fn require_sync(&self) -> Result<(), CliError> {
        if !self.remote_configured {
            return Err(CliError::SyncNotConfigured);
        }
        if self.offline_flag {
            return Err(CliError::OfflineSession);
        }
        Ok(())
    }

    pub fn close(self) -> Result<(), CliError> {
        self.engine.close()?;
        Ok(())
    }
}

pub async fn open_session(db_path: &Path, offline: bool) -> Result<Session, CliError> {
    let config = CliConfig::load().map_err(CliError::Config)?;
    open_session_with(db_path, offline, &config).await
}

/// Open the store and wire the engine.
///
/// Without remote settings the engine runs offline against a detached remote,
/// so writes still land in the queue.
pub async fn open_session_with(
    db_path: &Path,
    offline: bool,
    config: &CliConfig,
) -> Result<Session, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let engine_config = config.engine_config();
    let remote_config = config.remote_config();
    let store = LocalStore::open(db_path)?;

    let remote_configured = remote_config.is_configured();
    let (remote, initial): (Arc<dyn RemoteStore>, Connectivity) = if remote_configured {
        let remote: Arc<dyn RemoteStore> = Arc::new(PostgrestRemote::new(
            &remote_config,
            engine_config.operation_timeout(),
        )?);
        let initial = if offline {
            Connectivity::Offline
        } else {
            check_reachability(
                remote.as_ref(),
                engine_config.operation_timeout().min(PING_TIMEOUT),
            )
            .await
        };
        (remote, initial)
    } else {
        let detached = MemoryRemote::new();
        detached.set_reachable(false);
        (Arc::new(detached), Connectivity::Offline)
    };

    if remote_configured && !offline && !initial.is_online() {
        tracing::warn!("Remote unreachable, working offline");
    }

    let mut session = Session::from_parts(store, remote, engine_config, initial)?;
    session.remote_configured = remote_configured;
    session.offline_flag = offline;
    Ok(session)
}

async fn check_reachability(remote: &dyn RemoteStore, timeout: Duration) -> Connectivity {
    let reachable = matches!(tokio::time::timeout(timeout, remote.ping()).await, Ok(Ok(())));
    Connectivity::from(reachable)
}

/// Wait for the sync a write kicked off, so the process does not exit
/// mid-push, then describe where the write ended up.
pub async fn settle_write<T>(
    engine: &SyncEngine,
    receipt: &mut WriteReceipt<T>,
) -> Result<&'static str, CliError> {
    if let Some(handle) = receipt.sync.take() {
        match handle.await {
            Ok(outcome) => {
                outcome?;
            }
            Err(error) => tracing::warn!("Background sync task failed: {error}"),
        }
    }

    if receipt.mode == WriteMode::Direct {
        return Ok("written to remote");
    }
    let still_queued = match receipt.entry.as_ref() {
        Some(entry) => engine
            .pending_mutations()?
            .iter()
            .any(|item| &item.id == entry),
        None => false,
    };
    Ok(if still_queued {
        "saved offline, queued for sync"
    } else {
        "saved and synced"
    })
}

pub fn parse_record_id(value: &str) -> Result<RecordId, CliError> {
    let value = normalize_required(value, "Record ID")?;
    Ok(value.parse::<RecordId>()?)
}

pub fn normalize_required(value: &str, field: &'static str) -> Result<String, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_optional(value: Option<String>) -> Option<String> {
    satchel_core::util::non_blank(value)
}

/// Answers as `key=value` pairs, or one JSON object
pub fn parse_answers(parts: &[String]) -> Result<serde_json::Value, CliError> {
    if let [single] = parts {
        let trimmed = single.trim();
        if trimmed.starts_with('{') {
            let value = serde_json::from_str::<serde_json::Value>(trimmed)
                .map_err(|_| CliError::InvalidAnswer(single.clone()))?;
            if !value.is_object() {
                return Err(CliError::InvalidAnswer(single.clone()));
            }
            return Ok(value);
        }
    }

    let mut answers = serde_json::Map::new();
    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            return Err(CliError::InvalidAnswer(part.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidAnswer(part.clone()));
        }
        answers.insert(
            key.to_string(),
            serde_json::Value::String(value.trim().to_string()),
        );
    }

    if answers.is_empty() {
        return Err(CliError::EmptyAnswers);
    }
    Ok(serde_json::Value::Object(answers))
}

/// Pick the narrowest store filter; `unsynced` is applied after an index match
pub fn select_filter(index: Option<(IndexField, String)>, unsynced: bool) -> RecordFilter {
    match index {
        Some((field, value)) => RecordFilter::by(field, value),
        None if unsynced => RecordFilter::Unsynced,
        None => RecordFilter::All,
    }
}

pub fn retain_unsynced<T>(records: &mut Vec<Record<T>>, unsynced: bool) {
    if unsynced {
        records.retain(|record| !record.synced);
    }
}

#[derive(Debug, Serialize)]
pub struct AssignmentListItem {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub due_date: Option<String>,
    pub synced: bool,
    pub offline_created: bool,
    pub last_modified: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionListItem {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub answers: serde_json::Value,
    pub grade: Option<f64>,
    pub synced: bool,
    pub offline_created: bool,
    pub last_modified: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub action: String,
    pub kind: String,
    pub record_id: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub retries: u32,
    pub exhausted: bool,
    pub error: Option<String>,
}

pub fn assignment_to_list_item(record: &Record<Assignment>) -> AssignmentListItem {
    AssignmentListItem {
        id: record.id.to_string(),
        title: record.data.title.clone(),
        subject: record.data.subject.clone(),
        due_date: record.data.due_date.clone(),
        synced: record.synced,
        offline_created: record.offline_created,
        last_modified: record.last_modified,
        relative_time: format_relative_time(record.last_modified, Utc::now().timestamp_millis()),
    }
}

pub fn submission_to_list_item(record: &Record<Submission>) -> SubmissionListItem {
    SubmissionListItem {
        id: record.id.to_string(),
        assignment_id: record.data.assignment_id.clone(),
        student_id: record.data.student_id.clone(),
        answers: record.data.answers.clone(),
        grade: record.data.grade,
        synced: record.synced,
        offline_created: record.offline_created,
        last_modified: record.last_modified,
        relative_time: format_relative_time(record.last_modified, Utc::now().timestamp_millis()),
    }
}

pub fn queue_item_to_list_item(item: &QueueItem, max_retries: u32) -> QueueListItem {
    QueueListItem {
        id: item.id.to_string(),
        action: item.action.to_string(),
        kind: item.kind().to_string(),
        record_id: item.record_id().to_string(),
        timestamp: item.timestamp,
        timestamp_iso: format_sync_timestamp(item.timestamp),
        retries: item.retries,
        exhausted: item.is_exhausted(max_retries),
        error: item.error.clone(),
    }
}

pub fn format_assignment_lines(records: &[Record<Assignment>]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = short_id(&record.id);
            let title = truncate(&record.data.title, 32);
            let subject = truncate(&record.data.subject, 12);
            let due = record.data.due_date.as_deref().unwrap_or("-");
            let marker = sync_marker(record.synced);
            let relative_time = format_relative_time(record.last_modified, now_ms);
            format!("{id:<13}  {marker}  {title:<32}  {subject:<12}  due {due:<10}  {relative_time}")
        })
        .collect()
}

pub fn format_submission_lines(records: &[Record<Submission>]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = short_id(&record.id);
            let marker = sync_marker(record.synced);
            let grade = record
                .data
                .grade
                .map_or_else(|| "ungraded".to_string(), |grade| format!("grade {grade}"));
            let relative_time = format_relative_time(record.last_modified, now_ms);
            format!(
                "{id:<13}  {marker}  assignment={}  student={}  {grade:<10}  {relative_time}",
                record.data.assignment_id, record.data.student_id
            )
        })
        .collect()
}

pub fn format_queue_lines(items: &[QueueItem], max_retries: u32) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let flag = if item.is_exhausted(max_retries) {
                "FAILED"
            } else {
                "queued"
            };
            let mut line = format!(
                "{}  {flag:<6}  {:<6}  {:<10}  {}  retries={}",
                format_sync_timestamp(item.timestamp),
                item.action,
                item.kind(),
                item.record_id(),
                item.retries
            );
            if let Some(error) = item.error.as_deref() {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

const fn sync_marker(synced: bool) -> char {
    if synced {
        ' '
    } else {
        '*'
    }
}

fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

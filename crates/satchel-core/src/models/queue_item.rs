//! Mutation queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::record::{RecordId, RecordKind, RecordPayload};
use crate::error::Error;

/// Identifier of a queue entry (distinct from the record's id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEntryId(Uuid);

impl QueueEntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Remote operation owed for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown sync action '{other}'"))),
        }
    }
}

/// A replayable, retryable remote-bound write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueEntryId,
    pub action: SyncAction,
    /// Snapshot of the record at enqueue time; serialized as `type` + `data`
    #[serde(flatten)]
    pub payload: RecordPayload,
    /// Enqueue time (Unix ms)
    pub timestamp: i64,
    pub retries: u32,
    pub error: Option<String>,
}

impl QueueItem {
    #[must_use]
    pub fn new(action: SyncAction, payload: RecordPayload) -> Self {
        Self {
            id: QueueEntryId::new(),
            action,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            retries: 0,
            error: None,
        }
    }

    pub const fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    pub const fn record_id(&self) -> &RecordId {
        self.payload.id()
    }

    /// Whether automatic cycles gave up on this item
    pub const fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}

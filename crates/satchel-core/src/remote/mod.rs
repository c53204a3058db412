//! Remote authoritative store.
//!
//! The engine talks to the backend only through [`RemoteStore`]. Two
//! implementations ship with the crate: [`PostgrestRemote`] for a
//! Supabase/PostgREST backend and [`MemoryRemote`] for tests and demos.

mod memory;
mod postgrest;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RecordId, RecordKind, RecordPayload};

pub use memory::{MemoryRemote, RemoteCall};
pub use postgrest::PostgrestRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse remote payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{message} ({status})")]
    Api { status: u16, message: String },
    #[error("Remote operation timed out")]
    Timeout,
    #[error("Remote store unreachable: {0}")]
    Unavailable(String),
    #[error("Remote store rejected the write: {0}")]
    Rejected(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operation kinds, used for call logs and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchAll,
    Insert,
    Update,
    Delete,
    Ping,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchAll => "fetch_all",
            Self::Insert => "insert",
            Self::Update => "update_by_id",
            Self::Delete => "delete_by_id",
            Self::Ping => "ping",
        };
        f.write_str(name)
    }
}

/// Query/update API of the remote store.
///
/// Every write must be idempotent by record id: the engine delivers at least once.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Authoritative rows of one type; `owner` narrows per-student collections
    async fn fetch_all(
        &self,
        kind: RecordKind,
        owner: Option<&str>,
    ) -> RemoteResult<Vec<RecordPayload>>;

    /// Create the record, or overwrite it when the id already exists
    async fn insert(&self, payload: &RecordPayload) -> RemoteResult<()>;

    async fn update_by_id(&self, payload: &RecordPayload) -> RemoteResult<()>;

    async fn delete_by_id(&self, kind: RecordKind, id: &RecordId) -> RemoteResult<()>;

    /// Cheap reachability check for heartbeat connectivity
    async fn ping(&self) -> RemoteResult<()>;
}

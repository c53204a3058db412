//! Error types for satchel-core

use thiserror::Error;

use crate::models::{QueueEntryId, RecordKind};

/// Result type alias using satchel-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in satchel-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The local durable store cannot be opened or written.
    ///
    /// Fatal to offline features for the rest of the session.
    #[error("Offline storage unavailable: {0}")]
    StorageUnavailable(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single queued mutation could not be applied remotely
    #[error("Failed to sync {kind} {action} ({record_id}): {message}")]
    RemoteWriteFailed {
        kind: RecordKind,
        action: String,
        record_id: String,
        message: String,
    },

    /// Fetching authoritative records for one type failed
    #[error("Failed to pull {kind} records: {message}")]
    RemotePullFailed { kind: RecordKind, message: String },

    /// A queued mutation reached the retry ceiling and is no longer retried automatically
    #[error("Queue entry {entry} failed {retries} times and needs a manual retry")]
    RetryExhausted { entry: QueueEntryId, retries: u32 },
}

impl Error {
    /// Whether this error means the local store can no longer be trusted for writes.
    pub const fn is_storage_failure(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Sqlite(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_classified() {
        assert!(Error::StorageUnavailable("disk full".into()).is_storage_failure());
        assert!(!Error::InvalidInput("missing id".into()).is_storage_failure());
        assert!(!Error::RemotePullFailed {
            kind: RecordKind::Assignment,
            message: "timeout".into(),
        }
        .is_storage_failure());
    }

    #[test]
    fn remote_write_failure_message_names_the_record() {
        let error = Error::RemoteWriteFailed {
            kind: RecordKind::Submission,
            action: "create".into(),
            record_id: "s1".into(),
            message: "HTTP 500".into(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to sync submission create (s1): HTTP 500"
        );
    }
}

//! Observable sync state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RecordKind;

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    /// Last cycle finished with errors; any trigger starts a new cycle
    ErrorReported,
}

/// Read-only snapshot published to UI consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub phase: SyncPhase,
    pub pending_items: usize,
    pub exhausted_items: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// 0..=100, monotonic within a cycle
    pub sync_progress: u8,
    pub errors: Vec<String>,
    /// Completed cycles since the engine started
    pub cycles: u64,
}

impl SyncStatus {
    /// The user-facing warning for mutations that need a manual retry
    pub fn exhausted_warning(&self) -> Option<String> {
        match self.exhausted_items {
            0 => None,
            1 => Some("1 item failed to sync".to_string()),
            count => Some(format!("{count} items failed to sync")),
        }
    }
}

/// Summary of one pull-then-push pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub pulled_assignments: usize,
    pub pulled_submissions: usize,
    /// Pulled rows left alone because a local write is still pending
    pub kept_pending: usize,
    pub pushed: usize,
    pub failed: usize,
    pub skipped_exhausted: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub(crate) fn add_pulled(&mut self, kind: RecordKind, count: usize) {
        match kind {
            RecordKind::Assignment => self.pulled_assignments += count,
            RecordKind::Submission => self.pulled_submissions += count,
        }
    }

    pub const fn pulled(&self) -> usize {
        self.pulled_assignments + self.pulled_submissions
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of asking for a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already in flight
    Skipped,
    /// Connectivity monitor reports offline; nothing was attempted
    Offline,
}

impl SyncOutcome {
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped | Self::Offline => None,
        }
    }
}

/// Progress after `processed` of `total` items; an empty cycle is complete
pub(crate) fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = processed.min(total) * 100 / total;
    u8::try_from(percent).unwrap_or(100)
}

//! Data models for Satchel

mod assignment;
mod queue_item;
mod record;
mod submission;

pub use assignment::Assignment;
pub use queue_item::{QueueEntryId, QueueItem, SyncAction};
pub use record::{IndexField, Record, RecordData, RecordId, RecordKind, RecordPayload};
pub use submission::Submission;

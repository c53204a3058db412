//! Record envelope shared by every synced collection

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Assignment, Submission};
use crate::error::Error;

/// Stable identifier of a synced record.
///
/// Server-assigned ids are kept verbatim; ids minted on the client are UUID v7
/// so that offline-created records sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a new client-side id
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// The record types managed by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Assignment,
    Submission,
}

impl RecordKind {
    /// Every managed kind, in pull order
    pub const ALL: [Self; 2] = [Self::Assignment, Self::Submission];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Submission => "submission",
        }
    }

    /// Local collection (table) holding records of this kind
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Assignment => "assignments",
            Self::Submission => "submissions",
        }
    }

    /// Secondary index columns of this kind's collection
    pub const fn indexes(self) -> &'static [IndexField] {
        match self {
            Self::Assignment => &[IndexField::Subject, IndexField::DueDate],
            Self::Submission => &[IndexField::AssignmentId, IndexField::StudentId],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assignment" | "assignments" => Ok(Self::Assignment),
            "submission" | "submissions" => Ok(Self::Submission),
            other => Err(Error::InvalidInput(format!("unknown record type '{other}'"))),
        }
    }
}

/// Indexed fields that filtered reads can use without a full scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Subject,
    DueDate,
    AssignmentId,
    StudentId,
}

impl IndexField {
    pub const fn column(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::DueDate => "due_date",
            Self::AssignmentId => "assignment_id",
            Self::StudentId => "student_id",
        }
    }

    pub const fn kind(self) -> RecordKind {
        match self {
            Self::Subject | Self::DueDate => RecordKind::Assignment,
            Self::AssignmentId | Self::StudentId => RecordKind::Submission,
        }
    }
}

/// Domain payload carried inside a [`Record`].
///
/// The sync engine never looks inside the payload beyond the indexed fields.
pub trait RecordData:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: RecordKind;

    /// Value stored in the given secondary index column
    fn index_value(&self, field: IndexField) -> Option<String>;

    fn into_payload(record: Record<Self>) -> RecordPayload;

    fn from_payload(payload: RecordPayload) -> Option<Record<Self>>;
}

/// Envelope around a domain payload with the bookkeeping the sync engine needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: RecordId,
    #[serde(flatten)]
    pub data: T,
    /// True once the remote store accepted this exact version
    #[serde(default)]
    pub synced: bool,
    /// Last local write (Unix ms)
    #[serde(default)]
    pub last_modified: i64,
    /// True when the id was minted on this device
    #[serde(default)]
    pub offline_created: bool,
}

impl<T: RecordData> Record<T> {
    /// Wrap a payload as an unsynced local record
    #[must_use]
    pub fn new(id: RecordId, data: T) -> Self {
        Self {
            id,
            data,
            synced: false,
            last_modified: chrono::Utc::now().timestamp_millis(),
            offline_created: false,
        }
    }

    /// Wrap a payload that the remote store just handed us
    #[must_use]
    pub const fn from_remote(id: RecordId, data: T, last_modified: i64) -> Self {
        Self {
            id,
            data,
            synced: true,
            last_modified,
            offline_created: false,
        }
    }

    pub const fn kind(&self) -> RecordKind {
        T::KIND
    }

    pub fn into_payload(self) -> RecordPayload {
        T::into_payload(self)
    }
}

/// Tagged union of every record type, used wherever the type is only known at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RecordPayload {
    Assignment(Record<Assignment>),
    Submission(Record<Submission>),
}

impl RecordPayload {
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Assignment(_) => RecordKind::Assignment,
            Self::Submission(_) => RecordKind::Submission,
        }
    }

    pub const fn id(&self) -> &RecordId {
        match self {
            Self::Assignment(record) => &record.id,
            Self::Submission(record) => &record.id,
        }
    }

    pub const fn last_modified(&self) -> i64 {
        match self {
            Self::Assignment(record) => record.last_modified,
            Self::Submission(record) => record.last_modified,
        }
    }

    pub const fn is_synced(&self) -> bool {
        match self {
            Self::Assignment(record) => record.synced,
            Self::Submission(record) => record.synced,
        }
    }

    /// Copy of this payload with the `synced` flag replaced
    #[must_use]
    pub fn with_synced(mut self, synced: bool) -> Self {
        match &mut self {
            Self::Assignment(record) => record.synced = synced,
            Self::Submission(record) => record.synced = synced,
        }
        self
    }
}

impl From<Record<Assignment>> for RecordPayload {
    fn from(record: Record<Assignment>) -> Self {
        Self::Assignment(record)
    }
}

impl From<Record<Submission>> for RecordPayload {
    fn from(record: Record<Submission>) -> Self {
        Self::Submission(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn submission() -> Submission {
        Submission {
            assignment_id: "a1".into(),
            student_id: "student-1".into(),
            answers: serde_json::json!({"q1": "42"}),
            ..Submission::default()
        }
    }

    #[test]
    fn minted_ids_are_unique() {
        assert_ne!(RecordId::mint(), RecordId::mint());
    }

    #[test]
    fn record_id_rejects_blank_values() {
        assert!("   ".parse::<RecordId>().is_err());
        assert_eq!("  s1 ".parse::<RecordId>().unwrap().as_str(), "s1");
    }

    #[test]
    fn record_kind_parses_singular_and_plural() {
        assert_eq!("Assignments".parse::<RecordKind>().unwrap(), RecordKind::Assignment);
        assert_eq!("submission".parse::<RecordKind>().unwrap(), RecordKind::Submission);
        assert!("grades".parse::<RecordKind>().is_err());
    }

    #[test]
    fn indexes_belong_to_their_collection() {
        for kind in RecordKind::ALL {
            assert!(kind.indexes().iter().all(|field| field.kind() == kind));
        }
    }

    #[test]
    fn record_serializes_flat() {
        let mut record = Record::new("s1".parse().unwrap(), submission());
        record.last_modified = 10;
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "s1");
        assert_eq!(value["assignment_id"], "a1");
        assert_eq!(value["synced"], false);
        assert_eq!(value["last_modified"], 10);
    }

    #[test]
    fn remote_rows_without_bookkeeping_fields_deserialize() {
        let row = serde_json::json!({
            "id": "s9",
            "assignment_id": "a1",
            "student_id": "student-1",
            "answers": {"q1": "x"},
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let record: Record<Submission> = serde_json::from_value(row).unwrap();
        assert_eq!(record.id.as_str(), "s9");
        assert!(!record.synced);
        assert!(!record.offline_created);
    }

    #[test]
    fn payload_is_tagged_by_type() {
        let payload = Record::new("s1".parse().unwrap(), submission()).into_payload();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "submission");
        assert_eq!(value["data"]["id"], "s1");

        let parsed: RecordPayload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.kind(), RecordKind::Submission);
        assert!(parsed.with_synced(true).is_synced());
    }
}

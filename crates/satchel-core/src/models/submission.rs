//! Submission model

use serde::{Deserialize, Serialize};

use super::record::{IndexField, Record, RecordData, RecordKind, RecordPayload};

/// A student's answers to an assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub assignment_id: String,
    #[serde(default)]
    pub student_id: String,
    /// Free-form answers keyed however the assignment's questions are keyed
    #[serde(default)]
    pub answers: serde_json::Value,
    #[serde(default)]
    pub file_urls: Vec<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub auto_graded: bool,
}

impl Submission {
    pub fn new(
        assignment_id: impl Into<String>,
        student_id: impl Into<String>,
        answers: serde_json::Value,
    ) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            student_id: student_id.into(),
            answers,
            ..Self::default()
        }
    }
}

impl RecordData for Submission {
    const KIND: RecordKind = RecordKind::Submission;

    fn index_value(&self, field: IndexField) -> Option<String> {
        match field {
            IndexField::AssignmentId => Some(self.assignment_id.clone()),
            IndexField::StudentId => Some(self.student_id.clone()),
            IndexField::Subject | IndexField::DueDate => None,
        }
    }

    fn into_payload(record: Record<Self>) -> RecordPayload {
        RecordPayload::Submission(record)
    }

    fn from_payload(payload: RecordPayload) -> Option<Record<Self>> {
        match payload {
            RecordPayload::Submission(record) => Some(record),
            RecordPayload::Assignment(_) => None,
        }
    }
}

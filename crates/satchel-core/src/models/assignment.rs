//! Assignment model

use serde::{Deserialize, Serialize};

use super::record::{IndexField, Record, RecordData, RecordKind, RecordPayload};

/// An assignment handed out to students
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    /// Due date as sent by the server (ISO 8601)
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
    #[serde(default)]
    pub max_score: Option<f64>,
}

impl Assignment {
    pub fn new(title: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }
}

impl RecordData for Assignment {
    const KIND: RecordKind = RecordKind::Assignment;

    fn index_value(&self, field: IndexField) -> Option<String> {
        match field {
            IndexField::Subject => Some(self.subject.clone()),
            IndexField::DueDate => self.due_date.clone(),
            IndexField::AssignmentId | IndexField::StudentId => None,
        }
    }

    fn into_payload(record: Record<Self>) -> RecordPayload {
        RecordPayload::Assignment(record)
    }

    fn from_payload(payload: RecordPayload) -> Option<Record<Self>> {
        match payload {
            RecordPayload::Assignment(record) => Some(record),
            RecordPayload::Submission(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_values_cover_subject_and_due_date() {
        let mut assignment = Assignment::new("Essay", "english");
        assert_eq!(
            assignment.index_value(IndexField::Subject).as_deref(),
            Some("english")
        );
        assert_eq!(assignment.index_value(IndexField::DueDate), None);

        assignment.due_date = Some("2024-05-01".into());
        assert_eq!(
            assignment.index_value(IndexField::DueDate).as_deref(),
            Some("2024-05-01")
        );
        assert_eq!(assignment.index_value(IndexField::StudentId), None);
    }
}

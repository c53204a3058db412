use satchel_core::{Assignment, IndexField, Record, Submission};

use crate::commands::common::{
    assignment_to_list_item, format_assignment_lines, format_submission_lines,
    normalize_optional, retain_unsynced, select_filter, submission_to_list_item,
    AssignmentListItem, Session, SubmissionListItem,
};
use crate::error::CliError;

pub fn list_assignments(
    session: &Session,
    subject: Option<String>,
    unsynced: bool,
) -> Result<Vec<Record<Assignment>>, CliError> {
    let index = normalize_optional(subject).map(|subject| (IndexField::Subject, subject));
    let mut records = session
        .engine
        .assignments(&select_filter(index, unsynced))?;
    retain_unsynced(&mut records, unsynced);
    Ok(records)
}

/// Student filter goes to the index; an assignment filter narrows in memory
pub fn list_submissions(
    session: &Session,
    student: Option<String>,
    assignment: Option<String>,
    unsynced: bool,
) -> Result<Vec<Record<Submission>>, CliError> {
    let student = normalize_optional(student);
    let assignment = normalize_optional(assignment);

    let index = match (student, assignment.as_ref()) {
        (Some(student), _) => Some((IndexField::StudentId, student)),
        (None, Some(assignment)) => Some((IndexField::AssignmentId, assignment.clone())),
        (None, None) => None,
    };
    let mut records = session
        .engine
        .submissions(&select_filter(index, unsynced))?;
    if let Some(assignment) = assignment {
        records.retain(|record| record.data.assignment_id == assignment);
    }
    retain_unsynced(&mut records, unsynced);
    Ok(records)
}

pub fn run_assignments(
    session: &Session,
    subject: Option<String>,
    unsynced: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let records = list_assignments(session, subject, unsynced)?;

    if as_json {
        let json_items = records
            .iter()
            .map(assignment_to_list_item)
            .collect::<Vec<AssignmentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No assignments stored on this device.");
    } else {
        for line in format_assignment_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn run_submissions(
    session: &Session,
    student: Option<String>,
    assignment: Option<String>,
    unsynced: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let records = list_submissions(session, student, assignment, unsynced)?;

    if as_json {
        let json_items = records
            .iter()
            .map(submission_to_list_item)
            .collect::<Vec<SubmissionListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No submissions stored on this device.");
    } else {
        for line in format_submission_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}

use satchel_core::{Assignment, RecordData, RecordId, Submission, SyncAction};

use crate::commands::common::{
    normalize_optional, normalize_required, parse_answers, parse_record_id, settle_write, Session,
};
use crate::error::CliError;

pub struct AssignmentInput {
    pub title: String,
    pub subject: String,
    pub due: Option<String>,
    pub description: Option<String>,
    pub id: Option<String>,
}

pub struct SubmissionInput {
    pub assignment: String,
    pub student: String,
    pub id: Option<String>,
    pub answers: Vec<String>,
}

/// Existing local records are updated in place; unknown ids are created
fn resolve_target<T: RecordData>(
    session: &Session,
    id: Option<&str>,
) -> Result<(SyncAction, Option<RecordId>, Option<T>), CliError> {
    let Some(id) = id else {
        return Ok((SyncAction::Create, None, None));
    };
    let id = parse_record_id(id)?;
    match session.engine.store().get::<T>(&id)? {
        Some(existing) => Ok((SyncAction::Update, Some(id), Some(existing.data))),
        None => Ok((SyncAction::Create, Some(id), None)),
    }
}

pub async fn save_assignment(
    session: &Session,
    input: AssignmentInput,
) -> Result<(RecordId, &'static str), CliError> {
    let title = normalize_required(&input.title, "Title")?;
    let subject = normalize_required(&input.subject, "Subject")?;
    let (action, id, existing) = resolve_target::<Assignment>(session, input.id.as_deref())?;

    let mut assignment = existing.unwrap_or_default();
    assignment.title = title;
    assignment.subject = subject;
    if let Some(due) = normalize_optional(input.due) {
        assignment.due_date = Some(due);
    }
    if let Some(description) = normalize_optional(input.description) {
        assignment.description = description;
    }

    let mut receipt = session.engine.write(action, id, assignment).await?;
    let outcome = settle_write(&session.engine, &mut receipt).await?;
    Ok((receipt.record.id, outcome))
}

pub async fn save_submission(
    session: &Session,
    input: SubmissionInput,
) -> Result<(RecordId, &'static str), CliError> {
    let assignment_id = normalize_required(&input.assignment, "Assignment ID")?;
    let student_id = normalize_required(&input.student, "Student ID")?;
    let answers = parse_answers(&input.answers)?;
    let (action, id, existing) = resolve_target::<Submission>(session, input.id.as_deref())?;

    let mut submission = existing.unwrap_or_default();
    submission.assignment_id = assignment_id;
    submission.student_id = student_id;
    submission.answers = answers;
    submission.submitted_at = Some(chrono::Utc::now().to_rfc3339());

    let mut receipt = session.engine.write(action, id, submission).await?;
    let outcome = settle_write(&session.engine, &mut receipt).await?;
    Ok((receipt.record.id, outcome))
}

pub async fn run_assign(session: &Session, input: AssignmentInput) -> Result<(), CliError> {
    let (id, outcome) = save_assignment(session, input).await?;
    println!("{id}  ({outcome})");
    Ok(())
}

pub async fn run_submit(session: &Session, input: SubmissionInput) -> Result<(), CliError> {
    let (id, outcome) = save_submission(session, input).await?;
    println!("{id}  ({outcome})");
    Ok(())
}

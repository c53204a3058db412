use satchel_core::{SyncOutcome, SyncReport};

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_sync(session: &Session) -> Result<(), CliError> {
    session.require_sync()?;
    let outcome = session.engine.force_sync().await?;
    print_outcome(&outcome);
    Ok(())
}

pub async fn run_retry(session: &Session) -> Result<(), CliError> {
    session.require_sync()?;
    let outcome = session.engine.retry_failed().await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &SyncOutcome) {
    for line in format_outcome_lines(outcome) {
        println!("{line}");
    }
}

pub fn format_outcome_lines(outcome: &SyncOutcome) -> Vec<String> {
    match outcome {
        SyncOutcome::Offline => vec!["Remote unreachable; changes stay queued.".to_string()],
        SyncOutcome::Skipped => vec!["A sync is already running.".to_string()],
        SyncOutcome::Completed(report) => format_report_lines(report),
    }
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: pulled {} assignments and {} submissions, pushed {}, failed {}",
        report.pulled_assignments, report.pulled_submissions, report.pushed, report.failed
    )];
    if report.kept_pending > 0 {
        lines.push(format!(
            "Kept {} local records with unsynced changes",
            report.kept_pending
        ));
    }
    if report.skipped_exhausted > 0 {
        lines.push(format!(
            "Skipped {} items that reached the retry limit; run `satchel retry`",
            report.skipped_exhausted
        ));
    }
    lines.extend(report.errors.iter().map(|error| format!("  error: {error}")));
    lines
}

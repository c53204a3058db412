use satchel_core::SyncStatus;

use crate::commands::common::{
    format_queue_lines, format_sync_timestamp, queue_item_to_list_item, QueueListItem, Session,
};
use crate::error::CliError;

pub fn run_queue(session: &Session, as_json: bool) -> Result<(), CliError> {
    let items = session.engine.pending_mutations()?;
    let max_retries = session.engine.config().max_retries;

    if as_json {
        let json_items = items
            .iter()
            .map(|item| queue_item_to_list_item(item, max_retries))
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_queue_lines(&items, max_retries) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_status(session: &Session, as_json: bool) -> Result<(), CliError> {
    let status = session.engine.refresh_status()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status, session.remote_configured) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(status: &SyncStatus, remote_configured: bool) -> Vec<String> {
    let connection = match (remote_configured, status.is_online) {
        (false, _) => "not configured",
        (true, true) => "online",
        (true, false) => "offline",
    };
    let last_sync = status.last_sync_time.map_or_else(
        || "never".to_string(),
        |at| format_sync_timestamp(at.timestamp_millis()),
    );

    let mut lines = vec![
        format!("Remote:       {connection}"),
        format!("Pending:      {}", status.pending_items),
        format!("Last sync:    {last_sync}"),
    ];
    if let Some(warning) = status.exhausted_warning() {
        lines.push(format!("Warning:      {warning}; run `satchel retry`"));
    }
    lines
}

pub fn run_reset(session: &Session) -> Result<(), CliError> {
    let pending = session.engine.pending_mutations()?.len();
    session.engine.reset()?;
    if pending > 0 {
        tracing::warn!("Discarded {pending} unsynced mutations");
    }
    println!("Local data cleared.");
    Ok(())
}

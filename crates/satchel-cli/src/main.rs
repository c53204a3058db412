//! Satchel CLI - work on assignments from the terminal, online or not
//!
//! Writes land in the local store first and are pushed when the remote is reachable.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands, ConfigAction};
use crate::commands::common::{open_session, Session};
use crate::commands::config::{run_config_set, run_config_show, ConfigUpdate};
use crate::commands::delete::run_delete;
use crate::commands::list::{run_assignments, run_submissions};
use crate::commands::status::{run_queue, run_reset, run_status};
use crate::commands::sync::{run_retry, run_sync};
use crate::commands::write::{run_assign, run_submit, AssignmentInput, SubmissionInput};
use crate::config::{default_config_path, resolve_db_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("satchel=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Config edits must work even when the database cannot be opened
    let command = match cli.command {
        Commands::Config { action } => return run_config(action),
        command => command,
    };

    let db_path = resolve_db_path(cli.db_path).map_err(CliError::Config)?;
    let session = open_session(&db_path, cli.offline).await?;

    let result = dispatch(&session, command).await;
    let closed = session.close();
    result?;
    closed
}

async fn dispatch(session: &Session, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Assignments {
            subject,
            unsynced,
            json,
        } => run_assignments(session, subject, unsynced, json),
        Commands::Submissions {
            student,
            assignment,
            unsynced,
            json,
        } => run_submissions(session, student, assignment, unsynced, json),
        Commands::Assign {
            title,
            subject,
            due,
            description,
            id,
        } => {
            run_assign(
                session,
                AssignmentInput {
                    title,
                    subject,
                    due,
                    description,
                    id,
                },
            )
            .await
        }
        Commands::Submit {
            assignment,
            student,
            id,
            answers,
        } => {
            run_submit(
                session,
                SubmissionInput {
                    assignment,
                    student,
                    id,
                    answers,
                },
            )
            .await
        }
        Commands::Delete { kind, id } => run_delete(session, kind.into(), &id).await,
        Commands::Queue { json } => run_queue(session, json),
        Commands::Sync => run_sync(session).await,
        Commands::Retry => run_retry(session).await,
        Commands::Status { json } => run_status(session, json),
        Commands::Reset => run_reset(session),
        Commands::Config { action } => run_config(action),
    }
}

fn run_config(action: ConfigAction) -> Result<(), CliError> {
    let path = default_config_path().map_err(CliError::Config)?;
    match action {
        ConfigAction::Show => run_config_show(&path),
        ConfigAction::Set {
            url,
            anon_key,
            student,
            max_retries,
        } => run_config_set(
            &path,
            ConfigUpdate {
                url,
                anon_key,
                student,
                max_retries,
            },
        ),
    }
}

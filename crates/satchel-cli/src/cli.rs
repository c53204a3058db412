use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use satchel_core::RecordKind;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Work on assignments offline and sync when you're back online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Treat this session as offline: write locally and queue for later
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List assignments stored on this device
    Assignments {
        /// Only assignments for this subject
        #[arg(long)]
        subject: Option<String>,
        /// Only assignments with local changes not yet synced
        #[arg(long)]
        unsynced: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List submissions stored on this device
    Submissions {
        /// Only submissions by this student
        #[arg(long)]
        student: Option<String>,
        /// Only submissions for this assignment
        #[arg(long)]
        assignment: Option<String>,
        /// Only submissions with local changes not yet synced
        #[arg(long)]
        unsynced: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create or update an assignment
    Assign {
        #[arg(long)]
        title: String,
        #[arg(long)]
        subject: String,
        /// Due date (ISO 8601)
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Update this assignment instead of creating a new one
        #[arg(long)]
        id: Option<String>,
    },
    /// Submit answers for an assignment
    Submit {
        #[arg(long)]
        assignment: String,
        #[arg(long)]
        student: String,
        /// Update this submission instead of creating a new one
        #[arg(long)]
        id: Option<String>,
        /// Answers as key=value pairs or a single JSON object
        #[arg(required = true)]
        answers: Vec<String>,
    },
    /// Delete a record locally and queue the remote delete
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
    },
    /// Show queued mutations waiting for the remote
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull remote changes and push queued mutations
    Sync,
    /// Retry mutations that reached the retry limit
    Retry,
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every local record and queued mutation
    Reset,
    /// Manage the CLI config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file location and contents
    Show,
    /// Update remote and engine settings
    Set {
        /// Remote base URL (e.g. https://project.supabase.co)
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        anon_key: Option<String>,
        /// Student whose submissions are pulled
        #[arg(long)]
        student: Option<String>,
        /// Failed attempts before an item needs `satchel retry`
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Assignment,
    Submission,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Assignment => Self::Assignment,
            KindArg::Submission => Self::Submission,
        }
    }
}

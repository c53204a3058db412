use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] satchel_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("Invalid answer '{0}': expected key=value or a JSON object")]
    InvalidAnswer(String),
    #[error("No answers provided")]
    EmptyAnswers,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Set SATCHEL_SUPABASE_URL and SATCHEL_SUPABASE_ANON_KEY, or add a `remote` section to the config file."
    )]
    SyncNotConfigured,
    #[error("Sync is disabled while running with --offline")]
    OfflineSession,
}

//! Database layer for the offline store

mod connection;
mod migrations;
mod queue_repository;
mod record_repository;

pub use connection::Database;
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use record_repository::{RecordFilter, RecordRepository, SqliteRecordRepository, UpsertMode};

//! satchel-core - Core library for Satchel
//!
//! This crate contains the offline store, the mutation queue and the sync
//! engine that reconciles local writes with the remote authoritative store.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use config::{EngineConfig, RemoteConfig};
pub use db::RecordFilter;
pub use error::{Error, Result};
pub use models::{
    Assignment, IndexField, QueueEntryId, QueueItem, Record, RecordData, RecordId, RecordKind,
    RecordPayload, Submission, SyncAction,
};
pub use remote::{MemoryRemote, PostgrestRemote, RemoteError, RemoteStore};
pub use services::{LocalStore, OfflineWriter, SyncEngine, WriteMode, WriteReceipt};
pub use sync::{Connectivity, ConnectivityMonitor, SyncOutcome, SyncPhase, SyncReport, SyncStatus};

//! Offline sync engine: mutation queue, connectivity and reconciliation.

mod connectivity;
mod orchestrator;
mod queue;
mod status;

pub use connectivity::{spawn_heartbeat, Connectivity, ConnectivityMonitor, ReconnectCallback};
pub use orchestrator::SyncOrchestrator;
pub use queue::MutationQueue;
pub use status::{SyncOutcome, SyncPhase, SyncReport, SyncStatus};

//! Services shared by every Satchel front-end.

mod engine;
mod store;
mod writer;

pub use engine::SyncEngine;
pub use store::LocalStore;
pub use writer::{OfflineWriter, WriteMode, WriteReceipt};

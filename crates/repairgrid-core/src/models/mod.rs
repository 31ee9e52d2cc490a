//! Data models for RepairGrid

mod record;
mod sync_log;
mod table;

pub use record::{generate_record_id, Fields, Record, SyncState};
pub use sync_log::{SyncAction, SyncLogEntry};
pub use table::Table;

//! Database layer for RepairGrid

mod connection;
mod migrations;
mod repository;
mod sync_log_repository;

pub use connection::Database;
pub use repository::{json_to_sql, sql_to_json, RecordRepository, SqliteRecordRepository};
pub use sync_log_repository::{SqliteSyncLogRepository, SyncLogRepository};

//! Sync audit log repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{SyncAction, SyncLogEntry};

/// Trait for the append-only sync log
pub trait SyncLogRepository {
    /// Append an entry and return its row id
    fn append(
        &self,
        table: &str,
        record_id: Option<&str>,
        action: SyncAction,
        error: Option<&str>,
        timestamp: i64,
    ) -> Result<i64>;

    /// Newest entries first
    fn recent(&self, limit: usize) -> Result<Vec<SyncLogEntry>>;
}

/// `SQLite` implementation of `SyncLogRepository`
pub struct SqliteSyncLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogEntry> {
        let action: String = row.get(3)?;
        Ok(SyncLogEntry {
            id: row.get(0)?,
            table: row.get(1)?,
            record_id: row.get(2)?,
            // Unknown actions only appear if another writer touched the log.
            action: action.parse().unwrap_or(SyncAction::SyncError),
            timestamp: row.get(4)?,
            error: row.get(5)?,
        })
    }
}

impl SyncLogRepository for SqliteSyncLogRepository<'_> {
    fn append(
        &self,
        table: &str,
        record_id: Option<&str>,
        action: SyncAction,
        error: Option<&str>,
        timestamp: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_log (table_name, record_id, action, timestamp, error) VALUES (?, ?, ?, ?, ?)",
            params![table, record_id, action.as_str(), timestamp, error],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
    fn recent(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, table_name, record_id, action, timestamp, error
             FROM sync_log
             ORDER BY id DESC
             LIMIT ?",
        )?;

        let entries = stmt
            .query_map(params![limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }
}

//! Local store: the thread-safe persistence service used by hosts and the
//! sync engine.
//!
//! Every local mutation marks its row unsynced and stamps it with a strictly
//! increasing `last_modified`; every mutation and push outcome is appended to
//! the sync log inside the same transaction.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{
    json_to_sql, Database, RecordRepository, SqliteRecordRepository, SqliteSyncLogRepository,
    SyncLogRepository,
};
use crate::error::{Error, Result};
use crate::models::{generate_record_id, Fields, Record, SyncAction, SyncLogEntry, Table};
use crate::schema::schema_for;
use crate::util::{now_millis, MonotonicClock};

/// Thread-safe service for local record operations.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    clock: Arc<MonotonicClock>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self::from_database(Database::open(&db_path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Insert a new row and return its id.
    ///
    /// `data` may carry an `id`; otherwise one is generated. Columns left out
    /// take their defaults. Retrying an insert with the same id and the same
    /// values is a no-op; any other id collision is a storage error.
    pub async fn insert(&self, table: Table, mut data: Fields) -> Result<String> {
        let id = match data.remove("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Null) | None => generate_record_id(),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "{table} id must be a non-empty string, got {other}"
                )))
            }
        };
        check_columns(table, &data)?;

        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        if let Some(existing) = repo.get(table, &id)? {
            if !existing.deleted && same_values(&existing.fields, &data) {
                tracing::debug!("Insert of {table}/{id} already applied");
                return Ok(id);
            }
        }

        let mut record = Record::new(id, data);
        record.last_modified = self.clock.tick();

        let tx = db.connection().unchecked_transaction()?;
        repo.insert(table, &record)?;
        SqliteSyncLogRepository::new(&tx).append(
            table.as_str(),
            Some(&record.id),
            SyncAction::Insert,
            None,
            now_millis(),
        )?;
        tx.commit()?;

        tracing::debug!("Inserted {table}/{}", record.id);
        Ok(record.id)
    }

    /// Merge `partial` into an existing row and mark it unsynced.
    pub async fn update(&self, table: Table, id: &str, mut partial: Fields) -> Result<bool> {
        match partial.remove("id") {
            None => {}
            Some(Value::String(given)) if given == id => {}
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "cannot change {table}/{id} id to {other}"
                )))
            }
        }
        check_columns(table, &partial)?;

        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        let current = repo
            .get(table, id)?
            .filter(|record| !record.deleted)
            .ok_or_else(|| Error::not_found(table.as_str(), id))?;
        let last_modified = self.clock.tick_after(current.last_modified);

        let tx = db.connection().unchecked_transaction()?;
        repo.update_fields(table, id, &partial, last_modified)?;
        SqliteSyncLogRepository::new(&tx).append(
            table.as_str(),
            Some(id),
            SyncAction::Update,
            None,
            now_millis(),
        )?;
        tx.commit()?;

        tracing::debug!("Updated {table}/{id}");
        Ok(true)
    }

    /// Delete a row. Does not cascade to dependent tables.
    ///
    /// Rows the remote has never seen disappear at once. Rows the remote holds
    /// become tombstones until the next push confirms the remote delete.
    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&self, table: Table, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        let Some(current) = repo.get(table, id)?.filter(|record| !record.deleted) else {
            return Ok(false);
        };

        let tx = db.connection().unchecked_transaction()?;
        if current.remote_known {
            repo.tombstone(table, id, self.clock.tick_after(current.last_modified))?;
        } else {
            repo.purge(table, id)?;
        }
        SqliteSyncLogRepository::new(&tx).append(
            table.as_str(),
            Some(id),
            SyncAction::Delete,
            None,
            now_millis(),
        )?;
        tx.commit()?;

        tracing::debug!("Deleted {table}/{id}");
        Ok(true)
    }

    /// All live rows matching `predicate`, most recently modified first.
    pub async fn find_all<F>(&self, table: Table, predicate: F) -> Result<Vec<Record>>
    where
        F: Fn(&Record) -> bool,
    {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        let mut records = repo.list(table)?;
        records.retain(|record| predicate(record));
        Ok(records)
    }

    /// Fetch a live row by id.
    pub async fn find_by_id(&self, table: Table, id: &str) -> Result<Option<Record>> {
        Ok(self
            .find_including_deleted(table, id)
            .await?
            .filter(|record| !record.deleted))
    }

    /// Fetch a row by id, pending tombstones included.
    pub async fn find_including_deleted(&self, table: Table, id: &str) -> Result<Option<Record>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.get(table, id)
    }

    /// Unsynced rows (tombstones included), oldest change first.
    pub async fn get_unsynced(&self, table: Table) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.list_unsynced(table)
    }

    /// Mark a row synced without touching `last_modified`.
    ///
    /// A synced tombstone has nothing left to confirm and is removed.
    pub async fn mark_synced(&self, table: Table, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        match repo.get(table, id)? {
            Some(record) if record.deleted => {
                repo.purge(table, id)?;
            }
            Some(_) => {
                repo.mark_synced(table, id)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Confirm a successful push of `pushed`.
    ///
    /// The row is marked synced only if it still carries the pushed version;
    /// a row edited while the push was in flight stays unsynced (but is now
    /// known to the remote) so the newer edit goes out next cycle.
    pub async fn confirm_push(&self, table: Table, pushed: &Record) -> Result<bool> {
        let action = pushed.push_action();
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        let tx = db.connection().unchecked_transaction()?;
        let confirmed = match repo.get(table, &pushed.id)? {
            Some(current) if current.last_modified == pushed.last_modified => {
                if current.deleted {
                    repo.purge(table, &pushed.id)?;
                } else {
                    repo.mark_synced(table, &pushed.id)?;
                }
                true
            }
            Some(_) => {
                repo.mark_remote_known(table, &pushed.id)?;
                false
            }
            None => false,
        };
        SqliteSyncLogRepository::new(&tx).append(
            table.as_str(),
            Some(&pushed.id),
            action,
            None,
            now_millis(),
        )?;
        tx.commit()?;

        Ok(confirmed)
    }

    /// Store a pulled record, already marked synced.
    ///
    /// With `expected_version: None` the row must not exist yet and is
    /// inserted. With `Some(version)` the existing live row is overwritten only
    /// if it still carries that `last_modified`. Returns whether anything was
    /// written.
    pub async fn store_pulled(
        &self,
        table: Table,
        record: &Record,
        expected_version: Option<i64>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        let tx = db.connection().unchecked_transaction()?;
        let action = match (repo.get(table, &record.id)?, expected_version) {
            (None, None) => {
                repo.insert(table, record)?;
                SyncAction::Insert
            }
            (Some(current), Some(version))
                if !current.deleted && current.last_modified == version =>
            {
                repo.replace(table, record)?;
                SyncAction::Update
            }
            _ => return Ok(false),
        };
        SqliteSyncLogRepository::new(&tx).append(
            table.as_str(),
            Some(&record.id),
            action,
            None,
            now_millis(),
        )?;
        tx.commit()?;

        Ok(true)
    }

    /// Append an entry to the sync log.
    pub async fn log_sync(
        &self,
        table: &str,
        record_id: Option<&str>,
        action: SyncAction,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteSyncLogRepository::new(db.connection());
        repo.append(table, record_id, action, error, now_millis())?;
        Ok(())
    }

    /// Newest sync log entries first.
    pub async fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let db = self.db.lock().await;
        let repo = SqliteSyncLogRepository::new(db.connection());
        repo.recent(limit)
    }

    /// Unsynced row counts per table, in sync order.
    pub async fn pending_changes(&self) -> Result<Vec<(Table, usize)>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        Table::SYNC_ORDER
            .into_iter()
            .map(|table| Ok((table, repo.count_unsynced(table)?)))
            .collect()
    }

    /// Write a row verbatim, metadata included.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, table: Table, record: &Record) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        if repo.get(table, &record.id)?.is_some() {
            repo.replace(table, record).map(|_| ())
        } else {
            repo.insert(table, record)
        }
    }
}

fn check_columns(table: Table, data: &Fields) -> Result<()> {
    let schema = schema_for(table);
    match data.keys().find(|column| !schema.has_column(column)) {
        Some(column) => Err(Error::InvalidInput(format!(
            "{table} has no column {column}"
        ))),
        None => Ok(()),
    }
}

/// Compare as `SQLite` stores the values: `true` equals `1`, `90` equals
/// `90.0`. A null in `given` was left to the column default and matches
/// anything.
fn same_values(stored: &Fields, given: &Fields) -> bool {
    given.iter().all(|(column, value)| {
        let stored = stored.get(column).map_or(SqlValue::Null, json_to_sql);
        value.is_null() || same_sql_value(&stored, &json_to_sql(value))
    })
}

#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn same_sql_value(left: &SqlValue, right: &SqlValue) -> bool {
    match (left, right) {
        (SqlValue::Integer(integer), SqlValue::Real(real))
        | (SqlValue::Real(real), SqlValue::Integer(integer)) => *integer as f64 == *real,
        _ => left == right,
    }
}

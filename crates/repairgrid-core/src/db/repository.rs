//! Entity record repository implementation
//!
//! Column lists come from the static schema descriptors and table names from
//! [`Table`], so interpolating them into SQL never involves caller input.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Fields, Record, SyncState, Table};
use crate::schema::{schema_for, EntitySchema};

const METADATA_COLUMNS: &str = "id, sync_state, last_modified, remote_known, deleted";
const METADATA_LEN: usize = 5;

/// Trait for entity storage operations
pub trait RecordRepository {
    /// Insert a row, including its sync metadata
    fn insert(&self, table: Table, record: &Record) -> Result<()>;

    /// Get a row by id, tombstones included
    fn get(&self, table: Table, id: &str) -> Result<Option<Record>>;

    /// List live rows (tombstones excluded)
    fn list(&self, table: Table) -> Result<Vec<Record>>;

    /// List unsynced rows, tombstones included, oldest change first
    fn list_unsynced(&self, table: Table) -> Result<Vec<Record>>;

    /// Count unsynced rows, tombstones included
    fn count_unsynced(&self, table: Table) -> Result<usize>;

    /// Overwrite entity columns and mark the row unsynced
    fn update_fields(
        &self,
        table: Table,
        id: &str,
        fields: &Fields,
        last_modified: i64,
    ) -> Result<bool>;

    /// Replace a row wholesale, metadata included
    fn replace(&self, table: Table, record: &Record) -> Result<bool>;

    /// Set `sync_state = synced` and `remote_known`, leaving `last_modified` alone
    fn mark_synced(&self, table: Table, id: &str) -> Result<bool>;

    /// Record that the remote holds the row without touching its sync state
    fn mark_remote_known(&self, table: Table, id: &str) -> Result<bool>;

    /// Turn a row into an unsynced tombstone
    fn tombstone(&self, table: Table, id: &str, last_modified: i64) -> Result<bool>;

    /// Physically remove a row
    fn purge(&self, table: Table, id: &str) -> Result<bool>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn select_sql(schema: &EntitySchema, filter: &str) -> String {
        let columns = schema.columns().collect::<Vec<_>>().join(", ");
        format!(
            "SELECT {METADATA_COLUMNS}, {columns} FROM {} {filter}",
            schema.table
        )
    }

    fn query_records(&self, table: Table, filter: &str) -> Result<Vec<Record>> {
        let schema = schema_for(table);
        let mut stmt = self.conn.prepare(&Self::select_sql(schema, filter))?;
        let records = stmt
            .query_map([], |row| Self::parse_record(schema, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Parse a record from a database row
    fn parse_record(schema: &EntitySchema, row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let mut fields = Fields::new();
        for (offset, column) in schema.columns().enumerate() {
            let value = sql_to_json(row.get_ref(METADATA_LEN + offset)?);
            fields.insert(column.to_string(), value);
        }

        Ok(Record {
            id: row.get(0)?,
            fields,
            sync_state: SyncState::from_i64(row.get(1)?),
            last_modified: row.get(2)?,
            remote_known: row.get::<_, i64>(3)? != 0,
            deleted: row.get::<_, i64>(4)? != 0,
        })
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert(&self, table: Table, record: &Record) -> Result<()> {
        let schema = schema_for(table);
        // Absent and null columns are left out so column DEFAULTs still apply.
        let supplied = schema
            .columns()
            .filter(|column| record.fields.get(*column).is_some_and(|value| !value.is_null()))
            .collect::<Vec<_>>();

        let mut columns = METADATA_COLUMNS.to_string();
        for column in &supplied {
            columns.push_str(", ");
            columns.push_str(column);
        }
        let placeholders = vec!["?"; METADATA_LEN + supplied.len()].join(", ");

        let mut values = vec![
            SqlValue::Text(record.id.clone()),
            SqlValue::Integer(record.sync_state.as_i64()),
            SqlValue::Integer(record.last_modified),
            SqlValue::Integer(i64::from(record.remote_known)),
            SqlValue::Integer(i64::from(record.deleted)),
        ];
        values.extend(supplied.iter().map(|column| json_to_sql(&record.fields[*column])));

        self.conn.execute(
            &format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})"),
            params_from_iter(values),
        )?;
        Ok(())
    }

    fn get(&self, table: Table, id: &str) -> Result<Option<Record>> {
        let schema = schema_for(table);
        let record = self
            .conn
            .query_row(&Self::select_sql(schema, "WHERE id = ?"), [id], |row| {
                Self::parse_record(schema, row)
            })
            .optional()?;
        Ok(record)
    }

    fn list(&self, table: Table) -> Result<Vec<Record>> {
        self.query_records(table, "WHERE deleted = 0 ORDER BY last_modified DESC")
    }

    fn list_unsynced(&self, table: Table) -> Result<Vec<Record>> {
        self.query_records(
            table,
            "WHERE sync_state = 0 ORDER BY last_modified ASC, id ASC",
        )
    }

    fn count_unsynced(&self, table: Table) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE sync_state = 0"),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn update_fields(
        &self,
        table: Table,
        id: &str,
        fields: &Fields,
        last_modified: i64,
    ) -> Result<bool> {
        let schema = schema_for(table);
        let changed = schema
            .columns()
            .filter(|column| fields.contains_key(*column))
            .collect::<Vec<_>>();

        let mut assignments = String::from("sync_state = 0, last_modified = ?");
        for column in &changed {
            assignments.push_str(", ");
            assignments.push_str(column);
            assignments.push_str(" = ?");
        }

        let mut values = vec![SqlValue::Integer(last_modified)];
        values.extend(changed.iter().map(|column| json_to_sql(&fields[*column])));
        values.push(SqlValue::Text(id.to_string()));

        let rows = self.conn.execute(
            &format!("UPDATE {table} SET {assignments} WHERE id = ? AND deleted = 0"),
            params_from_iter(values),
        )?;
        Ok(rows > 0)
    }

    fn replace(&self, table: Table, record: &Record) -> Result<bool> {
        let schema = schema_for(table);
        let mut assignments =
            String::from("sync_state = ?, last_modified = ?, remote_known = ?, deleted = ?");
        for column in schema.columns() {
            assignments.push_str(", ");
            assignments.push_str(column);
            assignments.push_str(" = ?");
        }

        let mut values = vec![
            SqlValue::Integer(record.sync_state.as_i64()),
            SqlValue::Integer(record.last_modified),
            SqlValue::Integer(i64::from(record.remote_known)),
            SqlValue::Integer(i64::from(record.deleted)),
        ];
        values.extend(
            schema
                .columns()
                .map(|column| record.fields.get(column).map_or(SqlValue::Null, json_to_sql)),
        );
        values.push(SqlValue::Text(record.id.clone()));

        let rows = self.conn.execute(
            &format!("UPDATE {table} SET {assignments} WHERE id = ?"),
            params_from_iter(values),
        )?;
        Ok(rows > 0)
    }

    fn mark_synced(&self, table: Table, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            &format!("UPDATE {table} SET sync_state = 1, remote_known = 1 WHERE id = ?"),
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn mark_remote_known(&self, table: Table, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            &format!("UPDATE {table} SET remote_known = 1 WHERE id = ?"),
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn tombstone(&self, table: Table, id: &str, last_modified: i64) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {table} SET deleted = 1, sync_state = 0, last_modified = ? WHERE id = ? AND deleted = 0"
            ),
            params![last_modified, id],
        )?;
        Ok(rows > 0)
    }

    fn purge(&self, table: Table, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?"), params![id])?;
        Ok(rows > 0)
    }
}

/// Convert a JSON value into an `SQLite` value
///
/// Booleans become `0`/`1`; arrays and objects are stored as JSON text.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || SqlValue::Real(number.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert an `SQLite` value into JSON
pub fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Value::from(number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
    }
}

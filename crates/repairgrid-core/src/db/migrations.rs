//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Run a batch of statements atomically
fn apply(conn: &Connection, version: i32, statements: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(statements)?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entity tables
///
/// Every entity table carries the same sync metadata columns:
/// `sync_state` (0 unsynced, 1 synced), `last_modified` (unix ms),
/// `remote_known` (remote holds the row) and `deleted` (pending tombstone).
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            address TEXT,
            sync_state INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL,
            remote_known INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS technicians (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            specialization TEXT,
            is_active INTEGER DEFAULT 1,
            sync_state INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL,
            remote_known INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            ticket_number TEXT,
            customer_id TEXT REFERENCES customers(id),
            technician_id TEXT REFERENCES technicians(id),
            device_make TEXT,
            device_model TEXT,
            serial_number TEXT,
            issue_description TEXT,
            diagnostic_notes TEXT,
            repair_actions TEXT,
            status TEXT NOT NULL,
            priority TEXT,
            estimated_cost REAL,
            final_cost REAL,
            date_received INTEGER,
            date_completed INTEGER,
            date_picked_up INTEGER,
            sync_state INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL,
            remote_known INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS parts (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id),
            name TEXT NOT NULL,
            part_number TEXT,
            cost REAL,
            quantity INTEGER DEFAULT 1,
            supplier TEXT,
            sync_state INTEGER NOT NULL DEFAULT 0,
            last_modified INTEGER NOT NULL,
            remote_known INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone);
        CREATE INDEX IF NOT EXISTS idx_tickets_customer ON tickets(customer_id);
        CREATE INDEX IF NOT EXISTS idx_tickets_technician ON tickets(technician_id);
        CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
        CREATE INDEX IF NOT EXISTS idx_parts_ticket ON parts(ticket_id);
        CREATE INDEX IF NOT EXISTS idx_customers_unsynced ON customers(sync_state, last_modified);
        CREATE INDEX IF NOT EXISTS idx_technicians_unsynced ON technicians(sync_state, last_modified);
        CREATE INDEX IF NOT EXISTS idx_tickets_unsynced ON tickets(sync_state, last_modified);
        CREATE INDEX IF NOT EXISTS idx_parts_unsynced ON parts(sync_state, last_modified);",
    )
}

/// Migration to version 2: sync audit log
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        "CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            record_id TEXT,
            action TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_log_timestamp ON sync_log(timestamp DESC);",
    )
}

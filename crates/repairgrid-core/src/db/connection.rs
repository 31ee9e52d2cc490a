//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use super::migrations;

/// Database wrapper for the embedded `SQLite` connection
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;

        let database = Self {
            conn,
            path: Some(path),
        };
        database.configure()?;
        database.migrate()?;
        tracing::info!(
            "Local database initialized at {}",
            database.path.as_deref().unwrap_or(Path::new(":memory:")).display()
        );
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let database = Self { conn, path: None };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` pragmas
    fn configure(&self) -> Result<()> {
        if self.path.is_some() {
            // WAL is meaningless for in-memory databases
            self.conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        self.conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        // Pull may deliver a child before its parent arrives; ordering is the
        // sync engine's job, not the storage engine's.
        self.conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
    }

    #[test]
    fn test_open_file_creates_schema() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("repair-grid.db");

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.path(), Some(db_path.as_path()));
        assert!(db_path.exists());

        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tickets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("repair-grid.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO customers (id, name, phone, last_modified) VALUES ('c1', 'Jo', '555', 1)",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        let name: String = db
            .connection()
            .query_row("SELECT name FROM customers WHERE id = 'c1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "Jo");
    }
}

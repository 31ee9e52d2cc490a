//! Per-cycle sync outcome.

use serde::Serialize;

use crate::error::Error;
use crate::models::Table;

/// What happened to one table during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: Table,
    pub pushed: usize,
    pub push_failed: usize,
    pub pulled_inserted: usize,
    pub pulled_updated: usize,
    pub pull_skipped: usize,
    pub pull_failed: usize,
    /// Table-scoped failure that cut the push or pull phase short
    pub error: Option<String>,
}

impl TableReport {
    pub const fn new(table: Table) -> Self {
        Self {
            table,
            pushed: 0,
            push_failed: 0,
            pulled_inserted: 0,
            pulled_updated: 0,
            pull_skipped: 0,
            pull_failed: 0,
            error: None,
        }
    }

    pub const fn is_clean(&self) -> bool {
        self.error.is_none() && self.push_failed == 0 && self.pull_failed == 0
    }

    pub(crate) fn add_error(&mut self, message: String) {
        self.error = Some(match self.error.take() {
            Some(previous) => format!("{previous}; {message}"),
            None => message,
        });
    }
}

/// Outcome of a full cycle over every table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub tables: Vec<TableReport>,
}

impl SyncReport {
    pub fn table(&self, table: Table) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableReport::is_clean)
    }

    pub fn pushed(&self) -> usize {
        self.tables.iter().map(|report| report.pushed).sum()
    }

    pub fn pulled(&self) -> usize {
        self.tables
            .iter()
            .map(|report| report.pulled_inserted + report.pulled_updated)
            .sum()
    }

    /// Table-scoped failures as [`Error::Sync`] values.
    pub fn errors(&self) -> Vec<Error> {
        self.tables
            .iter()
            .filter_map(|report| {
                report.error.as_ref().map(|message| Error::Sync {
                    table: report.table.to_string(),
                    message: message.clone(),
                })
            })
            .collect()
    }
}

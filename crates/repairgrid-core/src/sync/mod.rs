//! Sync engine: push local changes, then pull remote state, one table at a
//! time in parent-before-child order.
//!
//! Conflicts resolve last-writer-wins on `last_modified`; ties keep the local
//! row. Failures are contained: a record that fails to push stays unsynced, a
//! table that fails does not stop the tables after it.

mod report;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Record, SyncAction, Table};
use crate::remote::{ensure_success, into_records, list_function, mutation_function, RemoteClient};
use crate::schema::{remote_timestamp, to_local, to_remote, REMOTE_ID_FIELD};
use crate::services::LocalStore;
use crate::state::EngineState;
use crate::util::now_millis;

pub use report::{SyncReport, TableReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Clears the in-progress flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteClient>,
    in_progress: AtomicBool,
    last_sync: AtomicI64,
    last_report: RwLock<Option<SyncReport>>,
}

impl SyncEngine {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteClient>) -> Self {
        Self {
            store,
            remote,
            in_progress: AtomicBool::new(false),
            last_sync: AtomicI64::new(0),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        if self.is_syncing() {
            EngineState::Syncing
        } else {
            EngineState::Idle
        }
    }

    /// Completion time (Unix ms) of the last cycle, if any ran.
    pub fn last_sync(&self) -> Option<i64> {
        Some(self.last_sync.load(Ordering::Acquire)).filter(|millis| *millis > 0)
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    /// Run one full cycle.
    ///
    /// Returns `None` without touching the remote when a cycle is already
    /// running.
    pub async fn perform_sync(&self) -> Option<SyncReport> {
        let Some(_in_flight) = InFlight::acquire(&self.in_progress) else {
            tracing::debug!("Sync already in progress, skipping");
            return None;
        };

        tracing::info!("Starting sync");
        let started_at = now_millis();
        let mut tables = Vec::with_capacity(Table::SYNC_ORDER.len());
        for table in Table::SYNC_ORDER {
            tables.push(self.sync_table(table).await);
        }

        let report = SyncReport {
            started_at,
            finished_at: now_millis(),
            tables,
        };
        self.last_sync.store(report.finished_at, Ordering::Release);
        *self.last_report.write().await = Some(report.clone());

        if report.is_clean() {
            tracing::info!(
                "Sync completed: {} pushed, {} pulled",
                report.pushed(),
                report.pulled()
            );
        } else {
            tracing::warn!(
                "Sync completed with errors: {} pushed, {} pulled",
                report.pushed(),
                report.pulled()
            );
        }
        Some(report)
    }

    /// Start a cycle in the background unless one is already running.
    pub fn trigger(self: &Arc<Self>) {
        if self.is_syncing() {
            tracing::debug!("Sync already in progress, not triggering another");
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.perform_sync().await;
        });
    }

    /// Push then pull a single table. Never fails; problems land in the
    /// report and the sync log.
    pub async fn sync_table(&self, table: Table) -> TableReport {
        let mut report = TableReport::new(table);

        if let Err(error) = self.push_table(table, &mut report).await {
            self.record_table_error(table, SyncAction::SyncError, &error, &mut report)
                .await;
        }
        if let Err(error) = self.pull_table(table, &mut report).await {
            self.record_table_error(table, SyncAction::PullError, &error, &mut report)
                .await;
        }

        report
    }

    async fn push_table(&self, table: Table, report: &mut TableReport) -> Result<()> {
        let pending = self.store.get_unsynced(table).await?;
        if !pending.is_empty() {
            tracing::debug!("Pushing {} {table} changes", pending.len());
        }

        for record in pending {
            match self.push_record(table, &record).await {
                Ok(()) => report.pushed += 1,
                Err(error) => {
                    report.push_failed += 1;
                    tracing::warn!("Failed to push {table}/{}: {error}", record.id);
                    self.log_failure(table, Some(&record.id), SyncAction::PushError, &error)
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn push_record(&self, table: Table, record: &Record) -> Result<()> {
        let action = record.push_action();
        let function = mutation_function(table, action)?;
        let args = if action == SyncAction::Delete {
            let mut args = Map::new();
            args.insert(REMOTE_ID_FIELD.to_string(), Value::String(record.id.clone()));
            args
        } else {
            to_remote(table, record)?
        };

        let response = self.remote.call(&function, Value::Object(args)).await?;
        ensure_success(&function, &response)?;

        if !self.store.confirm_push(table, record).await? {
            tracing::debug!("{table}/{} changed during push, keeping it unsynced", record.id);
        }
        Ok(())
    }

    async fn pull_table(&self, table: Table, report: &mut TableReport) -> Result<()> {
        let function = list_function(table);
        let response = self
            .remote
            .call(&function, Value::Object(Map::new()))
            .await?;
        let remote_records = into_records(&function, response)?;

        for remote in &remote_records {
            match self.pull_record(table, remote).await {
                Ok(PullOutcome::Inserted) => report.pulled_inserted += 1,
                Ok(PullOutcome::Updated) => report.pulled_updated += 1,
                Ok(PullOutcome::Skipped) => report.pull_skipped += 1,
                Err(error) => {
                    report.pull_failed += 1;
                    let id = remote.get(REMOTE_ID_FIELD).and_then(Value::as_str);
                    tracing::warn!("Failed to pull {table} record {id:?}: {error}");
                    self.log_failure(table, id, SyncAction::PullError, &error)
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn pull_record(&self, table: Table, remote: &Map<String, Value>) -> Result<PullOutcome> {
        let incoming = to_local(table, remote)?;

        let Some(existing) = self
            .store
            .find_including_deleted(table, &incoming.id)
            .await?
        else {
            let stored = self.store.store_pulled(table, &incoming, None).await?;
            return Ok(if stored {
                PullOutcome::Inserted
            } else {
                PullOutcome::Skipped
            });
        };

        // A pending local delete outranks anything the remote still holds.
        if existing.deleted {
            return Ok(PullOutcome::Skipped);
        }

        match remote_timestamp(remote)? {
            Some(remote_modified) if remote_modified > existing.last_modified => {
                let stored = self
                    .store
                    .store_pulled(table, &incoming, Some(existing.last_modified))
                    .await?;
                Ok(if stored {
                    PullOutcome::Updated
                } else {
                    PullOutcome::Skipped
                })
            }
            _ => Ok(PullOutcome::Skipped),
        }
    }

    async fn record_table_error(
        &self,
        table: Table,
        action: SyncAction,
        error: &Error,
        report: &mut TableReport,
    ) {
        tracing::error!("Sync of {table} failed: {error}");
        report.add_error(error.to_string());
        self.log_failure(table, None, action, error).await;
    }

    async fn log_failure(
        &self,
        table: Table,
        record_id: Option<&str>,
        action: SyncAction,
        error: &Error,
    ) {
        let message = error.to_string();
        if let Err(log_error) = self
            .store
            .log_sync(table.as_str(), record_id, action, Some(message.as_str()))
            .await
        {
            tracing::error!("Failed to record {action} for {table}: {log_error}");
        }
    }
}

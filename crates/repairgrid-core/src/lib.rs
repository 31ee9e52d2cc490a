//! repairgrid-core - Offline-first data layer for RepairGrid
//!
//! This crate contains the local store, the schema translation between local
//! rows and remote records, connectivity monitoring, and the sync engine that
//! reconciles the two sides. Hosts talk to [`SyncService`].

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod schema;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{Fields, Record, SyncAction, SyncLogEntry, Table};
pub use remote::{HttpRemoteClient, RemoteClient};
pub use services::{LocalStore, SyncService, SyncStatus};
pub use state::ConnectivityState;
pub use sync::{SyncEngine, SyncReport, TableReport};

//! Services owned by the host: the local store and the sync service that
//! wires it to the remote.

mod store;
mod sync_service;

pub use store::LocalStore;
pub use sync_service::{SyncService, SyncStatus};

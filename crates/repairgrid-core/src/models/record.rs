//! Local record model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::SyncAction;

/// Field values of a record, keyed by local column name.
pub type Fields = Map<String, Value>;

/// Generate a new record id (UUID v7, time-sortable)
pub fn generate_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Whether the latest local mutation of a row has been confirmed remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Unsynced,
    Synced,
}

impl SyncState {
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unsynced => 0,
            Self::Synced => 1,
        }
    }

    pub const fn from_i64(value: i64) -> Self {
        if value == 0 {
            Self::Unsynced
        } else {
            Self::Synced
        }
    }
}

/// A row of one entity table together with its sync metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, shared with the remote as `_id`
    pub id: String,
    /// Entity columns (everything except the sync metadata)
    pub fields: Fields,
    /// Sync state of the latest mutation
    pub sync_state: SyncState,
    /// Last modification timestamp (Unix ms)
    pub last_modified: i64,
    /// The remote is known to hold this record
    pub remote_known: bool,
    /// Tombstone awaiting a remote delete
    pub deleted: bool,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            sync_state: SyncState::Unsynced,
            last_modified: 0,
            remote_known: false,
            deleted: false,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }

    /// Remote mutation needed to confirm this row.
    pub const fn push_action(&self) -> SyncAction {
        if self.deleted {
            SyncAction::Delete
        } else if self.remote_known {
            SyncAction::Update
        } else {
            SyncAction::Insert
        }
    }
}

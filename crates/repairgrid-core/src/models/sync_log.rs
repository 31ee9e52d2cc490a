//! Sync audit log model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    Insert,
    Update,
    Delete,
    PushError,
    PullError,
    SyncError,
}

impl SyncAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::PushError => "PUSH_ERROR",
            Self::PullError => "PULL_ERROR",
            Self::SyncError => "SYNC_ERROR",
        }
    }

    pub const fn is_error(self) -> bool {
        matches!(self, Self::PushError | Self::PullError | Self::SyncError)
    }

    /// Remote mutation suffix for push actions.
    pub const fn mutation(self) -> Option<&'static str> {
        match self {
            Self::Insert => Some("create"),
            Self::Update => Some("update"),
            Self::Delete => Some("delete"),
            Self::PushError | Self::PullError | Self::SyncError => None,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "PUSH_ERROR" => Ok(Self::PushError),
            "PULL_ERROR" => Ok(Self::PullError),
            "SYNC_ERROR" => Ok(Self::SyncError),
            other => Err(Error::InvalidInput(format!("Unknown sync action: {other}"))),
        }
    }
}

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Log row identifier
    pub id: i64,
    /// Table the entry refers to
    pub table: String,
    /// Record involved; `None` for table-scoped entries
    pub record_id: Option<String>,
    /// What happened
    pub action: SyncAction,
    /// When it happened (unix ms)
    pub timestamp: i64,
    /// Failure message for error actions
    pub error: Option<String>,
}

//! Shared state types reported to hosts.

use serde::{Deserialize, Serialize};

/// Reachability of the remote as last observed by the connectivity monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// No probe has completed yet
    #[default]
    Unknown,
    Online,
    Offline,
}

impl ConnectivityState {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Sync engine activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Syncing,
}

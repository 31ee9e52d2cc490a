//! Sync configuration.
//!
//! A single remote endpoint drives everything: without one the connectivity
//! monitor stays Offline for good and no sync cycle ever runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Environment variable holding the remote endpoint
pub const REMOTE_URL_ENV: &str = "REPAIRGRID_REMOTE_URL";
/// Fallback environment variable, as exported by Convex tooling
pub const CONVEX_URL_ENV: &str = "CONVEX_URL";
/// Environment variable holding the local database path
pub const DB_PATH_ENV: &str = "REPAIRGRID_DB_PATH";

const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_PROBE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Configuration for the local store and the sync loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Remote endpoint (e.g., `https://happy-otter-123.convex.cloud`)
    pub remote_url: Option<String>,
    /// Local database file; in-memory when absent
    pub database_path: Option<PathBuf>,
    /// Milliseconds between scheduled sync cycles
    pub sync_interval_ms: u64,
    /// Milliseconds between connectivity probes
    pub probe_interval_ms: u64,
    /// Probe timeout in ms, independent of remote call timeouts
    pub probe_timeout_ms: u64,
    /// Timeout for individual remote calls, in ms
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            database_path: None,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl SyncConfig {
    /// Create a configuration pointing at the given remote endpoint
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: normalize_text_option(Some(remote_url.into())),
            ..Self::default()
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// `REPAIRGRID_REMOTE_URL` wins over `CONVEX_URL`; blank values count as
    /// absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let remote_url = normalize_text_option(lookup(REMOTE_URL_ENV))
            .or_else(|| normalize_text_option(lookup(CONVEX_URL_ENV)));
        let database_path = normalize_text_option(lookup(DB_PATH_ENV)).map(PathBuf::from);

        Self {
            remote_url,
            database_path,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Durations are kept to the millisecond; anything finer is dropped and a
    /// sub-millisecond value fails [`validate`](Self::validate).
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = as_millis(interval);
        self
    }

    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval_ms = as_millis(interval);
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = as_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = as_millis(timeout);
        self
    }

    /// Check if a remote endpoint is configured
    pub const fn is_configured(&self) -> bool {
        self.remote_url.is_some()
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject malformed endpoints and zero intervals.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote_url {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "remote_url must include http:// or https://".to_string(),
                ));
            }
        }

        for (name, value) in [
            ("sync_interval_ms", self.sync_interval_ms),
            ("probe_interval_ms", self.probe_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidInput(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Composition root for the offline-first sync stack.
//!
//! Owns the local store, the connectivity monitor and the sync engine, and
//! drives them with two background tasks: the connectivity probe loop and the
//! periodic sync timer.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::LocalStore;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::models::Table;
use crate::remote::{HttpRemoteClient, RemoteClient};
use crate::state::ConnectivityState;
use crate::sync::{SyncEngine, SyncReport};

/// Snapshot reported to hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub connectivity: ConnectivityState,
    pub sync_in_progress: bool,
    /// Completion time (Unix ms) of the last cycle
    pub last_sync: Option<i64>,
    pub last_report: Option<SyncReport>,
    /// Unsynced rows per table, in sync order
    pub pending_changes: Vec<(Table, usize)>,
}

impl SyncStatus {
    pub fn total_pending(&self) -> usize {
        self.pending_changes.iter().map(|(_, count)| count).sum()
    }
}

pub struct SyncService {
    config: SyncConfig,
    store: LocalStore,
    monitor: Arc<ConnectivityMonitor>,
    engine: Option<Arc<SyncEngine>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    /// Open the store, connect the remote named by `config`, and start the
    /// background tasks.
    ///
    /// Without a remote endpoint the service still works locally; it simply
    /// never syncs.
    pub async fn initialize(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let store = match &config.database_path {
            Some(path) => LocalStore::open_path(path)?,
            None => {
                tracing::warn!("No database path configured, using an in-memory store");
                LocalStore::open_in_memory()?
            }
        };

        let remote: Option<Arc<dyn RemoteClient>> = match &config.remote_url {
            Some(url) => Some(Arc::new(HttpRemoteClient::new(
                url.as_str(),
                config.request_timeout(),
            )?)),
            None => {
                tracing::warn!("No remote configured, staying offline");
                None
            }
        };

        let service = Self::new(store, remote, config);
        service.start()?;
        Ok(service)
    }

    /// Wire the components without starting any background task.
    pub fn new(store: LocalStore, remote: Option<Arc<dyn RemoteClient>>, config: SyncConfig) -> Self {
        let engine = remote
            .clone()
            .map(|remote| Arc::new(SyncEngine::new(store.clone(), remote)));
        let monitor = Arc::new(ConnectivityMonitor::new(remote, config.probe_timeout()));

        Self {
            config,
            store,
            monitor,
            engine,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the probe loop and the sync timer. Calling it twice is a no-op.
    ///
    /// Fails without starting anything when the configuration is invalid.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return Ok(());
        }
        let Some(engine) = &self.engine else {
            return Ok(());
        };

        let on_reconnect = {
            let engine = Arc::clone(engine);
            move || engine.trigger()
        };
        tasks.push(
            Arc::clone(&self.monitor).spawn(self.config.probe_interval(), on_reconnect),
        );

        let engine = Arc::clone(engine);
        let monitor = Arc::clone(&self.monitor);
        let period = self.config.sync_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if scheduled_sync_allowed(&monitor) {
                    engine.trigger();
                }
            }
        }));

        tracing::info!(
            "Sync started: every {:?}, probing every {:?}",
            period,
            self.config.probe_interval()
        );
        Ok(())
    }

    /// Cancel the background tasks. A cycle already running is left to
    /// finish.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Sync stopped");
    }

    pub fn is_running(&self) -> bool {
        !self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub async fn get_status(&self) -> Result<SyncStatus> {
        let (sync_in_progress, last_sync, last_report) = match &self.engine {
            Some(engine) => (
                engine.is_syncing(),
                engine.last_sync(),
                engine.last_report().await,
            ),
            None => (false, None, None),
        };
        let connectivity = self.monitor.state();

        Ok(SyncStatus {
            online: connectivity.is_online(),
            connectivity,
            sync_in_progress,
            last_sync,
            last_report,
            pending_changes: self.store.pending_changes().await?,
        })
    }

    /// Run a cycle now, regardless of the timer or connectivity.
    ///
    /// Returns `None` when a cycle is already running or no remote is
    /// configured.
    pub async fn force_sync(&self) -> Option<SyncReport> {
        let engine = self.engine.as_ref()?;
        tracing::info!("Manual sync requested");
        engine.perform_sync().await
    }

    /// What the timer does on each tick, run inline: nothing while offline.
    pub async fn scheduled_sync(&self) -> Option<SyncReport> {
        let engine = self.engine.as_ref()?;
        if !scheduled_sync_allowed(&self.monitor) {
            return None;
        }
        engine.perform_sync().await
    }

    pub fn set_work_offline(&self, offline: bool) {
        self.monitor.set_work_offline(offline);
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Gate shared by the timer and [`SyncService::scheduled_sync`].
fn scheduled_sync_allowed(monitor: &ConnectivityMonitor) -> bool {
    if monitor.is_online() {
        true
    } else {
        tracing::debug!("Offline, skipping scheduled sync");
        false
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::remote::mock::MockRemote;

    fn config() -> SyncConfig {
        SyncConfig::new("https://example.convex.cloud")
    }

    fn service(remote: &Arc<MockRemote>) -> SyncService {
        let remote: Arc<dyn RemoteClient> = remote.clone();
        SyncService::new(LocalStore::open_in_memory().unwrap(), Some(remote), config())
    }

    async fn add_customer(service: &SyncService, id: &str) {
        service
            .store()
            .insert(
                Table::Customers,
                json!({"id": id, "name": "Jo", "phone": "555"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_sync_is_skipped_while_offline() {
        let remote = Arc::new(MockRemote::new());
        remote.set_reachable(false);
        let service = service(&remote);
        add_customer(&service, "c1").await;

        service.monitor().probe_once().await;
        assert!(service.scheduled_sync().await.is_none());
        assert_eq!(remote.call_count(), 0);

        let status = service.get_status().await.unwrap();
        assert!(!status.online);
        assert_eq!(status.total_pending(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_sync_runs_once_online() {
        let remote = Arc::new(MockRemote::new());
        let service = service(&remote);
        add_customer(&service, "c1").await;

        service.monitor().probe_once().await;
        let report = service.scheduled_sync().await.unwrap();
        assert_eq!(report.pushed(), 1);

        let status = service.get_status().await.unwrap();
        assert!(status.online);
        assert_eq!(status.connectivity, ConnectivityState::Online);
        assert_eq!(status.total_pending(), 0);
        assert_eq!(status.last_sync, Some(report.finished_at));
        assert_eq!(status.last_report, Some(report));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn force_sync_ignores_connectivity() {
        let remote = Arc::new(MockRemote::new());
        let service = service(&remote);
        add_customer(&service, "c1").await;

        assert_eq!(service.monitor().state(), ConnectivityState::Unknown);
        assert!(service.force_sync().await.is_some());
        assert!(remote.get(Table::Customers, "c1").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_force_sync_is_single_flight() {
        let remote = Arc::new(MockRemote::new());
        remote.set_delay(Duration::from_millis(50));
        let service = service(&remote);

        let results = tokio::join!(
            service.force_sync(),
            service.force_sync(),
            service.force_sync()
        );
        let completed = [results.0, results.1, results.2]
            .into_iter()
            .filter(Option::is_some)
            .count();

        assert_eq!(completed, 1);
        assert_eq!(remote.call_count(), Table::SYNC_ORDER.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn work_offline_blocks_scheduled_sync() {
        let remote = Arc::new(MockRemote::new());
        let service = service(&remote);
        service.monitor().probe_once().await;

        service.set_work_offline(true);
        assert!(service.scheduled_sync().await.is_none());
        assert_eq!(remote.call_count(), 0);

        service.set_work_offline(false);
        service.monitor().probe_once().await;
        assert!(service.scheduled_sync().await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn without_remote_everything_stays_local() {
        let service = SyncService::initialize(SyncConfig::default()).await.unwrap();
        add_customer(&service, "c1").await;

        assert!(!service.is_running());
        assert!(service.force_sync().await.is_none());

        let status = service.get_status().await.unwrap();
        assert_eq!(status.connectivity, ConnectivityState::Offline);
        assert_eq!(status.total_pending(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsynced_rows_survive_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SyncConfig::default().with_database_path(tmp.path().join("repair-grid.db"));

        {
            let service = SyncService::initialize(config.clone()).await.unwrap();
            add_customer(&service, "c1").await;
        }

        let service = SyncService::initialize(config).await.unwrap();
        let pending = service.store().get_unsynced(Table::Customers).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_rejects_invalid_config() {
        let error = SyncService::initialize(SyncConfig::new("not-a-url"))
            .await
            .err()
            .unwrap();
        assert!(matches!(error, crate::Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_triggers_a_sync_and_stop_cancels_tasks() {
        let remote = Arc::new(MockRemote::new());
        let config = config().with_probe_interval(Duration::from_millis(200));
        let remote_client: Arc<dyn RemoteClient> = remote.clone();
        let service = SyncService::new(
            LocalStore::open_in_memory().unwrap(),
            Some(remote_client),
            config,
        );
        add_customer(&service, "c1").await;

        service.start().unwrap();
        service.start().unwrap();
        assert!(service.is_running());

        tokio::time::timeout(Duration::from_secs(5), async {
            while remote.get(Table::Customers, "c1").is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        service.stop();
        assert!(!service.is_running());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let probes = remote.probe_count();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(remote.probe_count(), probes);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timer_skips_cycles_while_offline() {
        let remote = Arc::new(MockRemote::new());
        remote.set_reachable(false);
        let remote_client: Arc<dyn RemoteClient> = remote.clone();
        let config = config()
            .with_probe_interval(Duration::from_millis(20))
            .with_sync_interval(Duration::from_millis(50));
        let service = SyncService::new(
            LocalStore::open_in_memory().unwrap(),
            Some(remote_client),
            config,
        );
        add_customer(&service, "c1").await;

        service.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(remote.probe_count() >= 2);
        assert_eq!(remote.call_count(), 0);
        assert_eq!(service.get_status().await.unwrap().total_pending(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_rejects_invalid_intervals() {
        let remote = Arc::new(MockRemote::new());
        let remote_client: Arc<dyn RemoteClient> = remote.clone();
        let config = config().with_probe_interval(Duration::from_micros(500));
        let service = SyncService::new(
            LocalStore::open_in_memory().unwrap(),
            Some(remote_client),
            config,
        );

        assert!(service.start().is_err());
        assert!(!service.is_running());
        assert_eq!(remote.probe_count(), 0);
    }
}

//! Connectivity monitor.
//!
//! Probes the remote on a fixed period and publishes the result through a
//! watch channel. Without a configured remote the state is pinned to
//! `Offline`; the "work offline" switch does the same until it is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::RemoteClient;
use crate::state::ConnectivityState;

/// Result of one probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub previous: ConnectivityState,
    pub current: ConnectivityState,
}

impl Transition {
    /// The remote just became reachable after being unreachable or unknown.
    pub const fn reconnected(self) -> bool {
        !self.previous.is_online() && self.current.is_online()
    }
}

pub struct ConnectivityMonitor {
    remote: Option<Arc<dyn RemoteClient>>,
    probe_timeout: Duration,
    state: watch::Sender<ConnectivityState>,
    work_offline: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(remote: Option<Arc<dyn RemoteClient>>, probe_timeout: Duration) -> Self {
        let initial = if remote.is_some() {
            ConnectivityState::Unknown
        } else {
            ConnectivityState::Offline
        };
        let (state, _) = watch::channel(initial);

        Self {
            remote,
            probe_timeout,
            state,
            work_offline: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    pub fn is_work_offline(&self) -> bool {
        self.work_offline.load(Ordering::Acquire)
    }

    /// Force the monitor offline, or hand control back to the probe.
    ///
    /// Entering offline mode takes effect immediately; leaving it waits for
    /// the next probe.
    pub fn set_work_offline(&self, offline: bool) {
        self.work_offline.store(offline, Ordering::Release);
        if offline {
            self.publish(ConnectivityState::Offline);
        }
        tracing::info!("Work offline {}", if offline { "enabled" } else { "disabled" });
    }

    /// Probe the remote once and publish the outcome.
    pub async fn probe_once(&self) -> Transition {
        let sampled = self.sample().await;
        let transition = self.publish_sample(sampled);
        let Transition { previous, current } = transition;

        if transition.reconnected() {
            tracing::info!("Connection restored");
        } else if previous.is_online() && !current.is_online() {
            tracing::warn!("Connection lost");
        }
        transition
    }

    async fn sample(&self) -> ConnectivityState {
        let Some(remote) = &self.remote else {
            return ConnectivityState::Offline;
        };
        if self.is_work_offline() {
            return ConnectivityState::Offline;
        }

        match tokio::time::timeout(self.probe_timeout, remote.probe()).await {
            Ok(Ok(())) => ConnectivityState::Online,
            Ok(Err(error)) => {
                tracing::debug!("Connectivity probe failed: {error}");
                ConnectivityState::Offline
            }
            Err(_) => {
                tracing::debug!("Connectivity probe timed out after {:?}", self.probe_timeout);
                ConnectivityState::Offline
            }
        }
    }

    fn publish(&self, state: ConnectivityState) -> ConnectivityState {
        self.state.send_replace(state)
    }

    /// Publish a probe result unless work offline was switched on while the
    /// probe was in flight.
    fn publish_sample(&self, sampled: ConnectivityState) -> Transition {
        let mut transition = Transition {
            previous: sampled,
            current: sampled,
        };
        self.state.send_modify(|state| {
            transition.previous = *state;
            if self.is_work_offline() {
                transition.current = ConnectivityState::Offline;
            }
            *state = transition.current;
        });
        transition
    }

    /// Probe every `interval` (first probe immediately), calling `on_reconnect`
    /// whenever the remote comes back.
    pub fn spawn<F>(self: Arc<Self>, interval: Duration, on_reconnect: F) -> JoinHandle<()>
    where
        F: Fn() + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.probe_once().await.reconnected() {
                    on_reconnect();
                }
            }
        })
    }
}

//! Connectivity signals.
//!
//! `Connectivity` is the narrow interface the engine consumes: a current online flag
//! and transition notifications. `NetworkMonitor` is the in-process implementation;
//! outside a browser its state is driven by [`spawn_health_probe`] or by the host app.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::SyncError;
use crate::remote::RemoteApi;

/// Tag used when asking the platform for a background sync.
pub const BACKGROUND_SYNC_TAG: &str = "sync-mentoring-data";

/// Callback invoked with the new online flag on every transition.
pub type StatusListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`Connectivity::on_status_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Device connectivity as seen by the sync engine.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    fn on_status_change(&self, listener: StatusListener) -> ListenerId;

    /// Unregister a listener. Returns whether it was still registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Optional platform capability to wake the app later for a sync.
///
/// Callers treat both absence and failure as "not used".
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    async fn register(&self, tag: &str) -> Result<(), SyncError>;
}

/// Online/offline state with transition listeners.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    listeners: Mutex<BTreeMap<ListenerId, StatusListener>>,
    next_id: AtomicU64,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state,
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record the current connectivity. Listeners fire only on a real transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("Network: back online");
            } else {
                tracing::warn!("Network: offline, writes will be queued");
            }

            // Clone out so a listener may (un)register without deadlocking
            let listeners: Vec<StatusListener> = match self.listeners.lock() {
                Ok(guard) => guard.values().cloned().collect(),
                Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
            };
            for listener in listeners {
                listener(online);
            }
        }

        changed
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Watch channel mirroring the online flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn on_status_change(&self, listener: StatusListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut guard) => guard.insert(id, listener),
            Err(poisoned) => poisoned.into_inner().insert(id, listener),
        };
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.lock() {
            Ok(mut guard) => guard.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        }
    }
}

/// Poll the remote health endpoint and feed the result into `monitor`.
pub fn spawn_health_probe(
    monitor: Arc<NetworkMonitor>,
    remote: Arc<dyn RemoteApi>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = remote.health().await;
            monitor.set_online(online);
        }
    })
}

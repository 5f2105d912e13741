//! Sync coordinator.
//!
//! Drains the pending mutation queue against the remote, one action at a time in
//! enqueue order. At most one pass runs at a time: a request that arrives while a
//! pass is in flight is dropped, since the running pass or the next tick picks up
//! whatever that request would have seen.
//!
//! Passes are triggered by a periodic timer, by an offline-to-online transition,
//! or by an explicit [`SyncCoordinator::sync_now`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::db::{PendingQueue, RecordStore, ResponseCache};
use crate::errors::SyncError;
use crate::models::{HttpMethod, PendingAction, SyncStatus};
use crate::network::{Connectivity, ListenerId};
use crate::remote::{RemoteApi, RemoteRequest};

/// Default interval between automatic passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// One action that failed during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFailure {
    pub action_id: i64,
    pub url: String,
    pub error: SyncError,
}

/// Tally of one completed pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<ReplayFailure>,
}

/// What a sync request turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was in flight; this request was dropped
    AlreadyRunning,
    /// The device was offline; no call was attempted
    Offline,
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

struct Scheduler {
    shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

/// Replays queued writes and keeps record sync flags current.
///
/// The reconnect listener is unregistered on drop. A running scheduler holds the
/// coordinator alive until [`stop`](SyncCoordinator::stop).
pub struct SyncCoordinator {
    queue: PendingQueue,
    records: RecordStore,
    cache: ResponseCache,
    remote: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn Connectivity>,
    pass_lock: tokio::sync::Mutex<()>,
    reconnected: Arc<Notify>,
    reconnect_listener: ListenerId,
    scheduler: Mutex<Option<Scheduler>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: PendingQueue,
        records: RecordStore,
        cache: ResponseCache,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Arc<Self> {
        let reconnected = Arc::new(Notify::new());

        let signal = reconnected.clone();
        let reconnect_listener = connectivity.on_status_change(Arc::new(move |online| {
            if online {
                signal.notify_one();
            }
        }));

        Arc::new(Self {
            queue,
            records,
            cache,
            remote,
            connectivity,
            pass_lock: tokio::sync::Mutex::new(()),
            reconnected,
            reconnect_listener,
            scheduler: Mutex::new(None),
        })
    }

    /// Run one pass now unless one is already running or the device is offline.
    pub async fn sync_now(&self) -> SyncOutcome {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            tracing::debug!("Sync already in progress, dropping request");
            return SyncOutcome::AlreadyRunning;
        };

        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping sync pass");
            return SyncOutcome::Offline;
        }

        let report = self.run_pass().await;
        if report.synced > 0 || report.failed > 0 {
            tracing::info!("Sync pass finished: {} synced, {} failed", report.synced, report.failed);
        }
        SyncOutcome::Completed(report)
    }

    /// Whether a pass is in flight right now.
    pub fn is_syncing(&self) -> bool {
        self.pass_lock.try_lock().is_err()
    }

    /// Number of queued actions still awaiting acknowledgement.
    pub async fn pending_count(&self) -> usize {
        match self.queue.len().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Could not count pending actions: {}", e);
                0
            }
        }
    }

    /// Start automatic passes: one immediately, then every `interval` and on reconnect.
    ///
    /// Calling `start` while already started does nothing.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut slot = match self.scheduler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return;
        }

        let (shutdown, mut stopped) = oneshot::channel();
        let coordinator = Arc::clone(self);
        let reconnected = self.reconnected.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                    _ = reconnected.notified() => {
                        tracing::info!("Connectivity restored, syncing pending actions");
                    }
                }
                coordinator.sync_now().await;
            }
            tracing::debug!("Sync scheduler stopped");
        });

        tracing::info!("Periodic sync started every {:?}", interval);
        *slot = Some(Scheduler {
            shutdown,
            _task: task,
        });
    }

    /// Stop automatic passes. A pass already in flight runs to completion.
    pub fn stop(&self) {
        let scheduler = match self.scheduler.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(scheduler) = scheduler {
            let _ = scheduler.shutdown.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        match self.scheduler.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    async fn run_pass(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let actions = match self.queue.list().await {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!("Could not read pending actions: {}", e);
                return report;
            }
        };

        for action in actions {
            match self.remote.send(RemoteRequest::from(&action)).await {
                Ok(_) => {
                    self.acknowledge(&action).await;
                    report.synced += 1;
                }
                // Already gone on the server: the delete's goal holds
                Err(SyncError::NotFound(_)) if action.method == HttpMethod::Delete => {
                    tracing::debug!("Action {} deleted a missing resource {}", action.id, action.url);
                    self.acknowledge(&action).await;
                    report.synced += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "Replay of action {} ({} {}) failed: {}",
                        action.id,
                        action.method.as_str(),
                        action.url,
                        error
                    );
                    self.mark_record(&action, SyncStatus::Failed).await;
                    report.failed += 1;
                    report.errors.push(ReplayFailure {
                        action_id: action.id,
                        url: action.url.clone(),
                        error,
                    });
                }
            }
        }

        match self.cache.clear_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!("Purged {} expired cache entries", purged),
            Err(e) => tracing::debug!("Cache sweep skipped: {}", e),
        }

        report
    }

    async fn acknowledge(&self, action: &PendingAction) {
        if let Err(e) = self.queue.remove(action.id).await {
            // Left queued; replayed again next pass
            tracing::warn!("Could not dequeue acknowledged action {}: {}", action.id, e);
        }
        self.mark_record(action, SyncStatus::Synced).await;
    }

    async fn mark_record(&self, action: &PendingAction, status: SyncStatus) {
        let Some(record_id) = action.record_key() else {
            return;
        };
        match self.records.update_sync_status(record_id, status).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Record {} no longer stored locally", record_id),
            Err(e) => tracing::warn!("Could not mark record {} {}: {}", record_id, status.as_str(), e),
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.connectivity.remove_listener(self.reconnect_listener);
    }
}

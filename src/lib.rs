//! Offline-first draft storage and sync engine.
//!
//! Lets a multi-step observation form save, resume and submit while the client is
//! offline, then reconciles with the server once connectivity returns. The form
//! layer only ever talks to [`HybridStorage`].

pub mod config;
pub mod db;
pub mod errors;
pub mod hybrid;
pub mod merge;
pub mod models;
pub mod network;
pub mod remote;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

pub use config::Config;
pub use errors::SyncError;
pub use hybrid::{HybridStorage, SubmitOutcome};
pub use models::{DraftState, Record, RecordStatus, SyncStatus};
pub use network::{Connectivity, NetworkMonitor};
pub use remote::{HttpRemote, RemoteApi};
pub use sync::{SyncCoordinator, SyncOutcome, SyncReport};

use db::{DraftBackup, PendingQueue, RecordStore, ResponseCache};
use models::DEFAULT_CACHE_TTL;
use network::BackgroundSync;

/// Everything the façade needs, injected at construction.
///
/// Each context owns its own stores and signals, so independent instances can
/// coexist in one process.
#[derive(Clone)]
pub struct SyncContext {
    pub records: RecordStore,
    pub queue: PendingQueue,
    pub cache: ResponseCache,
    pub drafts: DraftBackup,
    pub remote: Arc<dyn RemoteApi>,
    pub connectivity: Arc<dyn Connectivity>,
    pub background: Option<Arc<dyn BackgroundSync>>,
    pub cache_ttl: Duration,
}

impl SyncContext {
    pub fn new(
        pool: SqlitePool,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            records: RecordStore::new(pool.clone()),
            queue: PendingQueue::new(pool.clone()),
            cache: ResponseCache::new(pool.clone()),
            drafts: DraftBackup::new(pool),
            remote,
            connectivity,
            background: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_background_sync(mut self, background: Arc<dyn BackgroundSync>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Keep the draft mirror under a different slot name.
    pub fn with_draft_slot(mut self, pool: SqlitePool, slot: &str) -> Self {
        self.drafts = DraftBackup::with_slot(pool, slot);
        self
    }
}

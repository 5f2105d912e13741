//! Offline-capable request wrapper.
//!
//! Reads are served from the response cache when the network is unavailable;
//! writes are queued for replay and acknowledged as queued.

use std::sync::Arc;
use std::time::Duration;

use super::{RemoteApi, RemoteRequest, RemoteResponse};
use crate::db::{PendingQueue, ResponseCache};
use crate::errors::SyncError;
use crate::models::{HttpMethod, NewPendingAction, PendingAction, DEFAULT_CACHE_TTL};
use crate::network::{BackgroundSync, Connectivity, BACKGROUND_SYNC_TAG};

/// Result of an offline-capable fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The remote answered
    Fresh(RemoteResponse),
    /// The remote was unreachable; served from cache
    Cached(serde_json::Value),
    /// The remote was unreachable; the write was queued for sync
    Queued(PendingAction),
}

/// Request wrapper that degrades to cache reads and queued writes.
#[derive(Clone)]
pub struct OfflineClient {
    remote: Arc<dyn RemoteApi>,
    cache: ResponseCache,
    queue: PendingQueue,
    connectivity: Arc<dyn Connectivity>,
    background: Option<Arc<dyn BackgroundSync>>,
    cache_ttl: Duration,
}

impl OfflineClient {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        cache: ResponseCache,
        queue: PendingQueue,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            remote,
            cache,
            queue,
            connectivity,
            background: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_background_sync(mut self, background: Option<Arc<dyn BackgroundSync>>) -> Self {
        self.background = background;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Online first; on a transport failure or while offline, fall back.
    ///
    /// A reply with an error status is returned as that error: the server was
    /// reachable, so nothing is cached or queued.
    pub async fn fetch(&self, request: RemoteRequest) -> Result<FetchOutcome, SyncError> {
        if self.connectivity.is_online() {
            match self.remote.send(request.clone()).await {
                Ok(response) => {
                    if request.method == HttpMethod::Get {
                        if let Some(body) = &response.body {
                            if let Err(e) = self.cache.put(&request.cache_key(), body, self.cache_ttl).await {
                                tracing::warn!("Failed to cache {}: {}", request.url, e);
                            }
                        }
                    }
                    return Ok(FetchOutcome::Fresh(response));
                }
                Err(SyncError::Network(msg)) => {
                    tracing::warn!("{} {} failed, going offline path: {}", request.method.as_str(), request.url, msg);
                }
                Err(e) => return Err(e),
            }
        }

        if request.method == HttpMethod::Get {
            return match self.cache.get(&request.cache_key()).await? {
                Some(data) => Ok(FetchOutcome::Cached(data)),
                None => Err(SyncError::Offline),
            };
        }

        let action = self.queue_request(request).await?;
        Ok(FetchOutcome::Queued(action))
    }

    /// Durably queue a write and ask for a background sync if the platform offers one.
    pub async fn queue_request(&self, request: RemoteRequest) -> Result<PendingAction, SyncError> {
        // Query parameters travel inside the queued url
        let mut action = NewPendingAction::new(request.method, request.cache_key());
        action.headers = request.headers;
        action.body = request.body;

        let queued = self.queue.enqueue(action).await?;
        tracing::info!("Action {} queued for sync", queued.id);

        if let Some(background) = &self.background {
            if let Err(e) = background.register(BACKGROUND_SYNC_TAG).await {
                tracing::debug!("Background sync registration unavailable: {}", e);
            }
        }

        Ok(queued)
    }
}

//! Hybrid storage façade.
//!
//! The single entry point for the form layer. Every local write lands in SQLite
//! first; remote writes are best effort and fall back to the pending queue or the
//! dirty flag. Nothing here returns an error to the caller: failures are logged and
//! reported as `false`, `None`, or an outcome variant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::errors::SyncError;
use crate::merge;
use crate::models::{DraftRequest, DraftState, Record, RecordStatus, SyncStatus, RECORD_KEY_FIELD};
use crate::remote::{
    delete_draft, delete_draft_request, get_draft, post_draft, FetchOutcome, OfflineClient,
    RemoteRequest, SUBMIT_PATH,
};
use crate::sync::{SyncCoordinator, SyncOutcome};
use crate::SyncContext;

/// Result of submitting a finished observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server acknowledged the submission
    Delivered { record_id: String },
    /// Stored locally and queued; a later pass will deliver it
    SavedOffline { record_id: String },
    /// Neither queued nor delivered
    Failed { record_id: String, reason: String },
}

impl SubmitOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            SubmitOutcome::Delivered { record_id }
            | SubmitOutcome::SavedOffline { record_id }
            | SubmitOutcome::Failed { record_id, .. } => record_id,
        }
    }

    /// User-facing status line.
    pub fn message(&self) -> &'static str {
        match self {
            SubmitOutcome::Delivered { .. } => "Observation submitted.",
            SubmitOutcome::SavedOffline { .. } => "Saved offline. Will sync when online.",
            SubmitOutcome::Failed { .. } => "Could not save observation. Please try again.",
        }
    }
}

/// Result of a full [`HybridStorage::sync`].
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSyncResult {
    pub queue: SyncOutcome,
    pub draft_synced: bool,
}

/// Local-first draft storage with best-effort server sync.
pub struct HybridStorage {
    ctx: SyncContext,
    coordinator: Arc<SyncCoordinator>,
    offline: OfflineClient,
    memory: Mutex<Option<DraftState>>,
    degraded: AtomicBool,
}

impl HybridStorage {
    pub fn new(ctx: SyncContext) -> Self {
        let coordinator = SyncCoordinator::new(
            ctx.queue.clone(),
            ctx.records.clone(),
            ctx.cache.clone(),
            ctx.remote.clone(),
            ctx.connectivity.clone(),
        );
        let offline = OfflineClient::new(
            ctx.remote.clone(),
            ctx.cache.clone(),
            ctx.queue.clone(),
            ctx.connectivity.clone(),
        )
        .with_background_sync(ctx.background.clone())
        .with_cache_ttl(ctx.cache_ttl);

        Self {
            ctx,
            coordinator,
            offline,
            memory: Mutex::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    // ==================== LOCAL MIRROR ====================

    /// Write the draft locally with a fresh `last_saved`. Never fails.
    ///
    /// When the store rejects the write the draft is kept in memory for the rest of
    /// the session and served by [`load_local`](Self::load_local).
    pub async fn save_local(&self, draft: &DraftState) -> DraftState {
        let mut saved = draft.clone();
        saved.last_saved = Utc::now();
        self.remember(Some(saved.clone()));

        match self.ctx.drafts.store(&saved).await {
            Ok(()) => self.degraded.store(false, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!("Failed to save draft locally, keeping it in memory: {}", e);
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
        saved
    }

    /// The locally held draft, if any.
    pub async fn load_local(&self) -> Option<DraftState> {
        if self.degraded.load(Ordering::SeqCst) {
            return self.recall();
        }
        match self.ctx.drafts.load().await {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!("Failed to load local draft, using in-memory copy: {}", e);
                self.recall()
            }
        }
    }

    pub async fn clear_local(&self) {
        self.remember(None);
        match self.ctx.drafts.clear().await {
            Ok(()) => self.degraded.store(false, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!("Failed to clear local draft: {}", e);
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
    }

    pub async fn has_unsaved_changes(&self) -> bool {
        self.load_local().await.map(|d| d.is_dirty).unwrap_or(false)
    }

    // ==================== SERVER ====================

    /// Upsert the draft on the server.
    ///
    /// On success the draft takes the server's key, is marked clean and mirrored
    /// locally. A 404 on update is retried once as a create. Any other failure
    /// mirrors the draft locally as dirty and returns `false`.
    pub async fn save_to_server(&self, draft: &mut DraftState) -> bool {
        let request = draft.to_request();

        match self.push_draft(&request).await {
            Ok(session_key) => {
                draft.session_key = Some(session_key);
                draft.is_dirty = false;
                *draft = self.save_local(draft).await;
                true
            }
            Err(e) => {
                tracing::warn!("Server save failed, keeping draft offline: {}", e);
                draft.is_dirty = true;
                *draft = self.save_local(draft).await;
                false
            }
        }
    }

    async fn push_draft(&self, request: &DraftRequest) -> Result<String, SyncError> {
        let remote = self.ctx.remote.as_ref();

        match post_draft(remote, request).await {
            Ok(response) => response
                .session_key
                .or_else(|| request.session_key.clone())
                .ok_or_else(|| SyncError::Serialization("Server did not assign a session key".to_string())),
            Err(SyncError::NotFound(_)) if request.session_key.is_some() => {
                tracing::info!(
                    "Draft {:?} not found on server, creating a new draft",
                    request.session_key
                );
                post_draft(remote, &request.as_create())
                    .await?
                    .session_key
                    .ok_or_else(|| SyncError::Serialization("Server did not assign a session key".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a draft from the server and refresh the local mirror with it.
    ///
    /// A 404 means the draft does not exist and yields `None`. Other failures fall
    /// back to the local copy when it carries the same key.
    pub async fn load_from_server(&self, session_key: &str) -> Option<DraftState> {
        match get_draft(self.ctx.remote.as_ref(), session_key).await {
            Ok(response) => {
                let draft = response.into_draft_state(session_key);
                self.save_local(&draft).await;
                Some(draft)
            }
            Err(SyncError::NotFound(_)) => {
                tracing::warn!("Draft not found on server for key {}", session_key);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to load draft from server, checking local copy: {}", e);
                self.local_with_key(session_key).await
            }
        }
    }

    /// Push the local draft if it is dirty and the device is online.
    pub async fn sync_to_server(&self) -> bool {
        let Some(mut local) = self.load_local().await else {
            return true;
        };
        if !local.is_dirty {
            return true;
        }
        if !self.ctx.connectivity.is_online() {
            return false;
        }
        self.save_to_server(&mut local).await
    }

    /// Reconcile a server copy with a local copy.
    pub fn merge_data(&self, server: Option<&DraftState>, local: &DraftState) -> DraftState {
        merge::merge(server, local)
    }

    // ==================== FORM-LEVEL OPERATIONS ====================

    /// Record a local edit and push it when online.
    ///
    /// Returns whether the server confirmed this exact state.
    pub async fn save_draft(&self, draft: &mut DraftState) -> bool {
        draft.is_dirty = true;
        *draft = self.save_local(draft).await;

        if !self.ctx.connectivity.is_online() {
            return false;
        }
        self.save_to_server(draft).await
    }

    /// Resume a draft, reconciling the server copy with any local copy of the same key.
    pub async fn load_draft(&self, session_key: &str) -> Option<DraftState> {
        let local = self.local_with_key(session_key).await;

        if !self.ctx.connectivity.is_online() {
            return local;
        }

        match get_draft(self.ctx.remote.as_ref(), session_key).await {
            Ok(response) => {
                let server = response.into_draft_state(session_key);
                let resolved = match &local {
                    Some(local) => merge::merge(Some(&server), local),
                    None => server,
                };
                Some(self.save_local(&resolved).await)
            }
            Err(SyncError::NotFound(_)) => {
                // Unsaved local edits are recreated on the next save
                local
            }
            Err(e) => {
                tracing::warn!("Failed to load draft {} from server: {}", session_key, e);
                local
            }
        }
    }

    /// Delete a draft after final submission.
    ///
    /// Returns whether the server confirmed the deletion; otherwise the delete is
    /// queued for replay. The local mirror is cleared either way.
    pub async fn delete_draft(&self, session_key: &str) -> bool {
        let confirmed = if self.ctx.connectivity.is_online() {
            match delete_draft(self.ctx.remote.as_ref(), session_key).await {
                Ok(()) | Err(SyncError::NotFound(_)) => true,
                Err(e) => {
                    tracing::warn!("Failed to delete draft {}: {}", session_key, e);
                    false
                }
            }
        } else {
            false
        };

        if !confirmed {
            if let Err(e) = self.offline.queue_request(delete_draft_request(session_key)).await {
                tracing::warn!("Failed to queue delete of draft {}: {}", session_key, e);
            }
        }

        if self.local_with_key(session_key).await.is_some() {
            self.clear_local().await;
        }
        confirmed
    }

    /// Store a finished observation and queue it for delivery.
    ///
    /// When online a sync pass runs immediately.
    pub async fn submit_record(&self, payload: Value) -> SubmitOutcome {
        let record = Record::new(payload, RecordStatus::Pending);
        let record_id = record.id.clone();

        if let Err(e) = self.ctx.records.save(&record).await {
            tracing::warn!("Failed to store record {} locally: {}", record_id, e);
        }

        let request = RemoteRequest::post(SUBMIT_PATH, submission_body(&record))
            .with_header("content-type", "application/json");

        let action = match self.offline.queue_request(request.clone()).await {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("Failed to queue record {}: {}", record_id, e);
                return self.submit_direct(request, record_id).await;
            }
        };

        if !self.ctx.connectivity.is_online() {
            return SubmitOutcome::SavedOffline { record_id };
        }

        self.coordinator.sync_now().await;
        let still_queued = match self.ctx.queue.list().await {
            Ok(actions) => actions.iter().any(|a| a.id == action.id),
            Err(_) => true,
        };

        if still_queued {
            SubmitOutcome::SavedOffline { record_id }
        } else {
            SubmitOutcome::Delivered { record_id }
        }
    }

    async fn submit_direct(&self, request: RemoteRequest, record_id: String) -> SubmitOutcome {
        if !self.ctx.connectivity.is_online() {
            return SubmitOutcome::Failed {
                record_id,
                reason: SyncError::Offline.to_string(),
            };
        }
        match self.ctx.remote.send(request).await {
            Ok(_) => {
                if let Err(e) = self.ctx.records.update_sync_status(&record_id, SyncStatus::Synced).await {
                    tracing::warn!("Could not mark record {} synced: {}", record_id, e);
                }
                SubmitOutcome::Delivered { record_id }
            }
            Err(e) => SubmitOutcome::Failed {
                record_id,
                reason: e.to_string(),
            },
        }
    }

    /// Replay queued writes, then push the local draft if it is dirty.
    pub async fn sync(&self) -> HybridSyncResult {
        let queue = self.coordinator.sync_now().await;
        let draft_synced = self.sync_to_server().await;
        HybridSyncResult {
            queue,
            draft_synced,
        }
    }

    /// Offline-capable request: cached reads, queued writes.
    pub async fn fetch(&self, request: RemoteRequest) -> Result<FetchOutcome, SyncError> {
        self.offline.fetch(request).await
    }

    // ==================== MAINTENANCE ====================

    pub fn start_auto_sync(&self, interval: Duration) {
        self.coordinator.start(interval);
    }

    pub fn stop_auto_sync(&self) {
        self.coordinator.stop();
    }

    pub async fn pending_count(&self) -> usize {
        self.coordinator.pending_count().await
    }

    /// Retention sweep for abandoned drafts. Returns how many were removed.
    pub async fn clear_old_drafts(&self, max_age: Duration) -> u64 {
        match self.ctx.records.clear_old_drafts(max_age).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Draft retention sweep failed: {}", e);
                0
            }
        }
    }

    async fn local_with_key(&self, session_key: &str) -> Option<DraftState> {
        self.load_local()
            .await
            .filter(|draft| draft.session_key.as_deref() == Some(session_key))
    }

    fn remember(&self, draft: Option<DraftState>) {
        match self.memory.lock() {
            Ok(mut guard) => *guard = draft,
            Err(poisoned) => *poisoned.into_inner() = draft,
        }
    }

    fn recall(&self) -> Option<DraftState> {
        match self.memory.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Record payload plus its id under `offlineId`, so replay can find the record.
fn submission_body(record: &Record) -> Value {
    match &record.payload {
        Value::Object(fields) => {
            let mut body = fields.clone();
            body.insert(RECORD_KEY_FIELD.to_string(), Value::String(record.id.clone()));
            Value::Object(body)
        }
        other => {
            let mut body = Map::new();
            body.insert("data".to_string(), other.clone());
            body.insert(RECORD_KEY_FIELD.to_string(), Value::String(record.id.clone()));
            Value::Object(body)
        }
    }
}

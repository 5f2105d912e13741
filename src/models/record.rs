//! Client-local record model for observation entries awaiting sync.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle stage of a record on the form side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Pending,
    Submitted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Pending => "pending",
            RecordStatus::Submitted => "submitted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RecordStatus::Draft),
            "pending" => Some(RecordStatus::Pending),
            "submitted" => Some(RecordStatus::Submitted),
            _ => None,
        }
    }
}

/// Whether the server holds the current payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(SyncStatus::Synced),
            "pending" => Some(SyncStatus::Pending),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// A generic client-local entity.
///
/// `sync_status == Synced` means the server held this exact `payload` as of `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub payload: Value,
    pub status: RecordStatus,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Build a fresh record with a generated `obs-` id.
    pub fn new(payload: Value, status: RecordStatus) -> Self {
        Self::with_id(format!("obs-{}", uuid::Uuid::new_v4()), payload, status)
    }

    /// Build a fresh record under a caller-chosen id.
    ///
    /// Timestamps are truncated to milliseconds, the precision the store keeps.
    pub fn with_id(id: impl Into<String>, payload: Value, status: RecordStatus) -> Self {
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: id.into(),
            payload,
            status,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a local edit: new payload, refreshed `updated_at`, back to `Pending`.
    pub fn touch(&mut self, payload: Value) {
        self.payload = payload;
        self.updated_at = Utc::now().trunc_subsecs(3);
        self.sync_status = SyncStatus::Pending;
    }
}

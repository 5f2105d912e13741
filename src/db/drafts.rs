//! Single-slot local mirror of the form's draft.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::format_ts;
use crate::errors::SyncError;
use crate::models::DraftState;

/// Slot name used when the caller does not pick one.
pub const DEFAULT_DRAFT_SLOT: &str = "observation_draft_backup";

/// Durable backup of one `DraftState` per slot.
#[derive(Clone)]
pub struct DraftBackup {
    pool: SqlitePool,
    slot: String,
}

impl DraftBackup {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_slot(pool, DEFAULT_DRAFT_SLOT)
    }

    pub fn with_slot(pool: SqlitePool, slot: impl Into<String>) -> Self {
        Self {
            pool,
            slot: slot.into(),
        }
    }

    pub async fn store(&self, draft: &DraftState) -> Result<(), SyncError> {
        let data = serde_json::to_string(draft)?;
        sqlx::query(
            r#"INSERT INTO draft_backup (storage_key, data, saved_at) VALUES (?, ?, ?)
               ON CONFLICT(storage_key) DO UPDATE SET data = excluded.data, saved_at = excluded.saved_at"#,
        )
        .bind(&self.slot)
        .bind(&data)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<DraftState>, SyncError> {
        let row = sqlx::query("SELECT data FROM draft_backup WHERE storage_key = ?")
            .bind(&self.slot)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    pub async fn clear(&self) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM draft_backup WHERE storage_key = ?")
            .bind(&self.slot)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

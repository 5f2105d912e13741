//! Pending mutation queue.
//!
//! A durable FIFO of writes the remote has not acknowledged. It does not
//! deduplicate; replay relies on upsert-by-key endpoints for idempotency.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::{format_ts, parse_ts};
use crate::errors::SyncError;
use crate::models::{HttpMethod, NewPendingAction, PendingAction};

/// Queue of not-yet-acknowledged remote writes.
#[derive(Clone)]
pub struct PendingQueue {
    pool: SqlitePool,
}

impl PendingQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an action. The row is committed before this returns.
    pub async fn enqueue(&self, action: NewPendingAction) -> Result<PendingAction, SyncError> {
        let timestamp = action.timestamp.unwrap_or_else(Utc::now);
        let headers = serde_json::to_string(&action.headers)?;
        let body = action
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO pending_actions (url, method, headers, body, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&action.url)
        .bind(action.method.as_str())
        .bind(&headers)
        .bind(&body)
        .bind(format_ts(&timestamp))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!("Queued {} {} as action {}", action.method.as_str(), action.url, id);

        Ok(PendingAction {
            id,
            url: action.url,
            method: action.method,
            headers: action.headers,
            body: action.body,
            timestamp: parse_ts(&format_ts(&timestamp))?,
        })
    }

    /// All queued actions in enqueue order.
    pub async fn list(&self) -> Result<Vec<PendingAction>, SyncError> {
        let rows = sqlx::query(
            "SELECT id, url, method, headers, body, timestamp FROM pending_actions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }

    /// Remove an acknowledged action. Returns whether it was still queued.
    pub async fn remove(&self, id: i64) -> Result<bool, SyncError> {
        let result = sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of queued actions.
    pub async fn len(&self) -> Result<usize, SyncError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len().await? == 0)
    }
}

fn action_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PendingAction, SyncError> {
    let method: String = row.get("method");
    let headers: String = row.get("headers");
    let body: Option<String> = row.get("body");
    let timestamp: String = row.get("timestamp");

    Ok(PendingAction {
        id: row.get("id"),
        url: row.get("url"),
        method: HttpMethod::from_str(&method)
            .ok_or_else(|| SyncError::Serialization(format!("Unknown method {:?}", method)))?,
        headers: serde_json::from_str::<BTreeMap<String, String>>(&headers)?,
        body: body.as_deref().map(serde_json::from_str).transpose()?,
        timestamp: parse_ts(&timestamp)?,
    })
}

//! Persistent record store.
//!
//! Upserts are single statements, so two saves of the same id never interleave at
//! the field level. Secondary-index reads go through [`IndexScan`], which pages
//! lazily over `(index key, id)`.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{format_ts, parse_ts};
use crate::errors::SyncError;
use crate::models::{Record, RecordStatus, SyncStatus};

const RECORD_COLUMNS: &str = "id, payload, status, sync_status, created_at, updated_at";
const DEFAULT_PAGE_SIZE: i64 = 64;

/// Store of client-local records keyed by `id`.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a record. `created_at` of an existing row is kept.
    pub async fn save(&self, record: &Record) -> Result<(), SyncError> {
        let payload = serde_json::to_string(&record.payload)?;

        sqlx::query(
            r#"INSERT INTO records (id, payload, status, sync_status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   payload = excluded.payload,
                   status = excluded.status,
                   sync_status = excluded.sync_status,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&record.id)
        .bind(&payload)
        .bind(record.status.as_str())
        .bind(record.sync_status.as_str())
        .bind(format_ts(&record.created_at))
        .bind(format_ts(&record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a record by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Record>, SyncError> {
        let row = sqlx::query(&format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// List all records, oldest first.
    pub async fn get_all(&self) -> Result<Vec<Record>, SyncError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records ORDER BY created_at, id",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Delete a record. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, SyncError> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip a record's sync status, touching `updated_at`.
    pub async fn update_sync_status(&self, id: &str, status: SyncStatus) -> Result<bool, SyncError> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query("UPDATE records SET sync_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records with the given lifecycle status (`by-status` index).
    pub fn by_status(&self, status: RecordStatus) -> IndexScan {
        IndexScan::new(self.pool.clone(), RecordIndex::Status(status))
    }

    /// Records with the given sync status (`by-sync` index).
    pub fn by_sync(&self, status: SyncStatus) -> IndexScan {
        IndexScan::new(self.pool.clone(), RecordIndex::Sync(status))
    }

    /// Records ordered by `updated_at`, optionally bounded above (inclusive).
    pub fn by_date(&self, until: Option<DateTime<Utc>>) -> IndexScan {
        IndexScan::new(self.pool.clone(), RecordIndex::UpdatedAt { until })
    }

    /// Retention sweep: delete drafts not touched within `max_age`.
    ///
    /// A window reaching past the earliest representable time sweeps nothing.
    pub async fn clear_old_drafts(&self, max_age: Duration) -> Result<u64, SyncError> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|max_age| Utc::now().checked_sub_signed(max_age));
        let Some(cutoff) = cutoff else {
            tracing::debug!("Retention window {:?} predates any record, nothing to sweep", max_age);
            return Ok(0);
        };

        let mut scan = self.by_date(Some(cutoff));
        let mut removed = 0;
        while let Some(record) = scan.next().await? {
            if record.status == RecordStatus::Draft && self.delete(&record.id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Swept {} abandoned drafts older than {}", removed, format_ts(&cutoff));
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
enum RecordIndex {
    Status(RecordStatus),
    Sync(SyncStatus),
    UpdatedAt { until: Option<DateTime<Utc>> },
}

/// Lazy, finite, restartable scan over one secondary index.
///
/// Rows are fetched a page at a time in index-key order; `restart` rewinds to the
/// first row and the next call to `next` re-reads from the store.
pub struct IndexScan {
    pool: SqlitePool,
    index: RecordIndex,
    page_size: i64,
    cursor: Option<(String, String)>,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl IndexScan {
    fn new(pool: SqlitePool, index: RecordIndex) -> Self {
        Self {
            pool,
            index,
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Override how many rows each round trip fetches.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1) as i64;
        self
    }

    /// Next record in index order, or `None` once the scan is exhausted.
    pub async fn next(&mut self) -> Result<Option<Record>, SyncError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Rewind to the beginning of the index.
    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Drain the remaining records into a vector.
    pub async fn collect(mut self) -> Result<Vec<Record>, SyncError> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }

    async fn fetch_page(&mut self) -> Result<(), SyncError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM records WHERE ", RECORD_COLUMNS));

        match &self.index {
            RecordIndex::Status(status) => {
                qb.push("status = ").push_bind(status.as_str());
            }
            RecordIndex::Sync(status) => {
                qb.push("sync_status = ").push_bind(status.as_str());
            }
            RecordIndex::UpdatedAt { until } => {
                qb.push("1 = 1");
                if let Some(until) = until {
                    qb.push(" AND updated_at <= ").push_bind(format_ts(until));
                }
            }
        }

        if let Some((key, id)) = &self.cursor {
            match self.index {
                RecordIndex::Status(_) | RecordIndex::Sync(_) => {
                    qb.push(" AND id > ").push_bind(id.clone());
                }
                RecordIndex::UpdatedAt { .. } => {
                    qb.push(" AND (updated_at > ")
                        .push_bind(key.clone())
                        .push(" OR (updated_at = ")
                        .push_bind(key.clone())
                        .push(" AND id > ")
                        .push_bind(id.clone())
                        .push("))");
                }
            }
        }

        match self.index {
            RecordIndex::Status(_) | RecordIndex::Sync(_) => qb.push(" ORDER BY id"),
            RecordIndex::UpdatedAt { .. } => qb.push(" ORDER BY updated_at, id"),
        };
        qb.push(" LIMIT ").push_bind(self.page_size);

        let rows = qb.build().fetch_all(&self.pool).await?;
        if (rows.len() as i64) < self.page_size {
            self.exhausted = true;
        }

        for row in &rows {
            self.buffer.push_back(record_from_row(row)?);
        }

        if let Some(last) = self.buffer.back() {
            let key = match self.index {
                RecordIndex::Status(_) => last.status.as_str().to_string(),
                RecordIndex::Sync(_) => last.sync_status.as_str().to_string(),
                RecordIndex::UpdatedAt { .. } => format_ts(&last.updated_at),
            };
            self.cursor = Some((key, last.id.clone()));
        }

        Ok(())
    }
}

// Helper functions for row conversion

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Record, SyncError> {
    let payload: String = row.get("payload");
    let status: String = row.get("status");
    let sync_status: String = row.get("sync_status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Record {
        id: row.get("id"),
        payload: serde_json::from_str(&payload)?,
        status: RecordStatus::from_str(&status)
            .ok_or_else(|| SyncError::Serialization(format!("Unknown status {:?}", status)))?,
        sync_status: SyncStatus::from_str(&sync_status).ok_or_else(|| {
            SyncError::Serialization(format!("Unknown sync status {:?}", sync_status))
        })?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

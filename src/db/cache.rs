//! TTL-bound response cache.
//!
//! Expiry is lazy: `get` purges a stale entry and reports a miss.
//! `clear_expired` is the only bulk sweep and is called opportunistically.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::SyncError;
use crate::models::CacheEntry;

/// Cache of prior successful read responses keyed by request identity.
#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store `data` under `key`, replacing any previous entry.
    pub async fn put(
        &self,
        key: &str,
        data: &serde_json::Value,
        ttl: Duration,
    ) -> Result<(), SyncError> {
        let encoded = serde_json::to_string(data)?;
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"INSERT INTO api_cache (key, url, data, timestamp, ttl_ms) VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   data = excluded.data,
                   timestamp = excluded.timestamp,
                   ttl_ms = excluded.ttl_ms"#,
        )
        .bind(key)
        .bind(key)
        .bind(&encoded)
        .bind(now)
        .bind(ttl_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cached data for `key`, or `None` on a miss or an expired entry.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, SyncError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.data))
    }

    /// Full cache entry for `key`, applying lazy expiry.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, SyncError> {
        let Some(entry) = self.read_entry(key).await? else {
            return Ok(None);
        };

        if !entry.is_fresh_at(Utc::now()) {
            tracing::debug!("Cache entry for {} expired, purging", key);
            self.purge_stale(&entry).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, SyncError> {
        let row = sqlx::query("SELECT key, data, timestamp, ttl_ms FROM api_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Delete `entry` only if its row has not been rewritten since it was read.
    async fn purge_stale(&self, entry: &CacheEntry) -> Result<bool, SyncError> {
        let result = sqlx::query("DELETE FROM api_cache WHERE key = ? AND timestamp = ?")
            .bind(&entry.key)
            .bind(entry.timestamp.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove one entry.
    pub async fn delete(&self, key: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM api_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Purge every expired entry. Returns how many were removed.
    pub async fn clear_expired(&self) -> Result<u64, SyncError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("DELETE FROM api_cache WHERE ? - timestamp >= ttl_ms")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CacheEntry, SyncError> {
    let data: String = row.get("data");
    let timestamp_ms: i64 = row.get("timestamp");
    let timestamp = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or_else(|| SyncError::Serialization(format!("Bad cache timestamp {}", timestamp_ms)))?;

    Ok(CacheEntry {
        key: row.get("key"),
        data: serde_json::from_str(&data)?,
        timestamp,
        ttl: row.get("ttl_ms"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_cache() -> (ResponseCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("cache.sqlite")).await.unwrap();
        (ResponseCache::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy_and_put_after_expiry_is_clean() {
        let (cache, _dir) = open_cache().await;
        let key = "/api/observations/indicators";

        cache.put(key, &json!({ "v": 1 }), Duration::from_millis(100)).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(json!({ "v": 1 })));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get(key).await.unwrap(), None);

        // The miss purged the stale row
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_cache")
            .fetch_one(&cache.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        cache.put(key, &json!({ "v": 2 }), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(json!({ "v": 2 })));
    }

    #[tokio::test]
    async fn test_stale_purge_spares_entry_rewritten_after_read() {
        let (cache, _dir) = open_cache().await;
        let key = "/api/indicators";

        cache.put(key, &json!({ "v": 1 }), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // A reader sees the stale row, then a writer refreshes it before the purge
        let stale = cache.read_entry(key).await.unwrap().unwrap();
        assert!(!stale.is_fresh_at(Utc::now()));
        cache.put(key, &json!({ "v": 2 }), Duration::from_secs(60)).await.unwrap();

        assert!(!cache.purge_stale(&stale).await.unwrap());
        assert_eq!(cache.get(key).await.unwrap(), Some(json!({ "v": 2 })));
    }

    #[tokio::test]
    async fn test_clear_expired_keeps_fresh_entries() {
        let (cache, _dir) = open_cache().await;

        cache.put("stale", &json!([1, 2, 3]), Duration::from_millis(10)).await.unwrap();
        cache.put("fresh", &json!("kept"), Duration::from_secs(3600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.clear_expired().await.unwrap(), 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(json!("kept")));
        assert!(cache.get("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hit_is_identical_to_stored_value() {
        let (cache, _dir) = open_cache().await;
        let data = json!({
            "indicators": [{ "fieldId": 1, "indicatorMain": "សួស្តី", "score": 3.5 }],
            "nested": { "empty": {}, "null": null }
        });

        cache.put("k", &data, Duration::from_secs(60)).await.unwrap();
        let entry = cache.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.data, data);
        assert_eq!(entry.ttl, 60_000);
    }
}

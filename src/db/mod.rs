//! Database module for local SQLite persistence.
//!
//! SQLite is the durable home of records, queued mutations, cached responses and
//! the draft mirror. Nothing outside this module touches the tables directly.

mod cache;
mod drafts;
mod pending;
mod records;

pub use cache::*;
pub use drafts::*;
pub use pending::*;
pub use records::*;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::errors::SyncError;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            sync_status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            headers TEXT NOT NULL DEFAULT '{}',
            body TEXT,
            timestamp TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_cache (
            key TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            ttl_ms INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS draft_backup (
            storage_key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            saved_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Secondary indexes backing the by-status / by-sync / by-date scans
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_records_status ON records(status, id);
        CREATE INDEX IF NOT EXISTS idx_records_sync_status ON records(sync_status, id);
        CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(updated_at, id);
        CREATE INDEX IF NOT EXISTS idx_api_cache_timestamp ON api_cache(timestamp);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Fixed-width RFC 3339 so that string order equals time order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SyncError::Serialization(format!("Bad timestamp {:?}: {}", raw, e)))
}

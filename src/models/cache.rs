//! Cached read response model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default lifetime of a cached GET response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// One cached read response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Validity window in milliseconds
    pub ttl: i64,
}

impl CacheEntry {
    /// A hit is valid iff `now - timestamp < ttl`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.timestamp_millis() - self.timestamp.timestamp_millis();
        age < self.ttl
    }
}

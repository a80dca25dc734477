//! Development-time inspection of the cache.

use serde::{Deserialize, Serialize};
use sitekit_data::ErrorClass;
use tokio::time::Instant;

use crate::entry::CacheEntry;

/// Point-in-time view of the cache contents and in-flight fetches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// One record per cached key, sorted by key.
    pub entries: Vec<EntrySnapshot>,
    /// Keys with a fetch in flight, sorted.
    pub in_flight: Vec<String>,
}

/// Inspection record for one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    /// Canonical key.
    pub key: String,
    /// Whether data is present.
    pub has_data: bool,
    /// Rust type name of the cached value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Whether the data is fresh.
    pub is_fresh: bool,
    /// Whether the entry was invalidated or never fetched successfully.
    pub is_invalidated: bool,
    /// Time since the last successful fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    /// Time since the entry was last read.
    pub idle_ms: u64,
    /// Freshness window.
    pub stale_after_ms: u64,
    /// Eviction window.
    pub evict_after_ms: u64,
    /// Failed attempts since the last success.
    pub retry_count: u32,
    /// Class of the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_class: Option<ErrorClass>,
    /// Number of successful fetches.
    pub update_count: u64,
}

impl EntrySnapshot {
    pub(crate) fn capture(entry: &CacheEntry, now: Instant) -> Self {
        Self {
            key: entry.key.as_str().to_string(),
            has_data: entry.data.is_some(),
            value_type: entry.type_name.map(str::to_string),
            is_fresh: entry.is_fresh(now),
            is_invalidated: entry.fetched_at.is_none(),
            age_ms: entry
                .fetched_at
                .map(|at| now.duration_since(at).as_millis() as u64),
            idle_ms: now.duration_since(entry.last_accessed).as_millis() as u64,
            stale_after_ms: entry.stale_after.as_millis() as u64,
            evict_after_ms: entry.evict_after.as_millis() as u64,
            retry_count: entry.retry_count,
            last_error_class: entry.last_error_class,
            update_count: entry.update_count,
        }
    }
}

impl CacheSnapshot {
    /// Find the record for a canonical key.
    pub fn entry(&self, key: &str) -> Option<&EntrySnapshot> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Convert to JSON for a debugging panel.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

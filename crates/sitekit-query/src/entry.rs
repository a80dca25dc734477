//! Cache entries.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitekit_data::ErrorClass;
use tokio::time::Instant;

use crate::key::QueryKey;
use crate::policy::QueryPolicy;

/// Type-erased cached value.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Status of a cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Stale hit (serving while revalidating).
    Stale,
    /// Cache miss, value fetched for this read.
    Miss,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Stale => write!(f, "STALE"),
            Self::Miss => write!(f, "MISS"),
        }
    }
}

/// One cached query.
pub(crate) struct CacheEntry {
    pub key: QueryKey,
    pub data: Option<AnyValue>,
    pub type_name: Option<&'static str>,
    /// `None` when never fetched successfully or invalidated.
    pub fetched_at: Option<Instant>,
    pub last_accessed: Instant,
    pub stale_after: Duration,
    pub evict_after: Duration,
    pub retry_count: u32,
    pub last_error_class: Option<ErrorClass>,
    pub update_count: u64,
    /// Bumped by every invalidation.
    pub generation: u64,
}

impl CacheEntry {
    pub fn new(key: QueryKey, policy: &QueryPolicy, now: Instant) -> Self {
        Self {
            key,
            data: None,
            type_name: None,
            fetched_at: None,
            last_accessed: now,
            stale_after: policy.stale_time,
            evict_after: policy.gc_time,
            retry_count: 0,
            last_error_class: None,
            update_count: 0,
            generation: 0,
        }
    }

    /// Whether data is present and inside the freshness window.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match (self.data.as_ref(), self.fetched_at) {
            (Some(_), Some(fetched_at)) => now.duration_since(fetched_at) < self.stale_after,
            _ => false,
        }
    }

    /// Whether the entry has been unused for longer than its eviction window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_accessed) >= self.evict_after
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
    }

    pub fn apply_policy(&mut self, policy: &QueryPolicy) {
        self.stale_after = policy.stale_time;
        self.evict_after = policy.gc_time;
    }

    pub fn record_success(&mut self, value: AnyValue, type_name: &'static str, now: Instant) {
        self.data = Some(value);
        self.type_name = Some(type_name);
        self.fetched_at = Some(now);
        self.last_accessed = now;
        self.retry_count = 0;
        self.last_error_class = None;
        self.update_count += 1;
    }

    /// Store the result of a fetch that began at `started_generation`.
    ///
    /// If the entry was invalidated while the fetch ran, the data is kept
    /// but stays stale so the next read refetches.
    pub fn record_fetch(
        &mut self,
        value: AnyValue,
        type_name: &'static str,
        now: Instant,
        started_generation: u64,
    ) {
        self.record_success(value, type_name, now);
        if self.generation != started_generation {
            self.fetched_at = None;
        }
    }

    pub fn record_failure(&mut self, class: ErrorClass) {
        self.retry_count += 1;
        self.last_error_class = Some(class);
    }

    pub fn invalidate(&mut self) {
        self.fetched_at = None;
        self.generation += 1;
    }
}

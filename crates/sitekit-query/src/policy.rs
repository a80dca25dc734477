//! Query cache policies.

use std::time::Duration;

use sitekit_core::QueryDefaults;
use sitekit_data::{BackoffStrategy, RetryPolicy};

/// Freshness, eviction and retry settings for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPolicy {
    /// How long fetched data is served without refetching.
    pub stale_time: Duration,
    /// How long an unused entry stays in the store.
    pub gc_time: Duration,
    /// Retry policy for fetches triggered by reads.
    pub retry: RetryPolicy,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            gc_time: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

impl QueryPolicy {
    /// Build from configured defaults.
    pub fn from_defaults(defaults: &QueryDefaults) -> Self {
        Self {
            stale_time: defaults.stale_time(),
            gc_time: defaults.gc_time(),
            retry: RetryPolicy::from_defaults(defaults),
        }
    }

    /// Set the freshness window.
    pub fn with_stale_time(mut self, duration: Duration) -> Self {
        self.stale_time = duration;
        self
    }

    /// Set the eviction window.
    pub fn with_gc_time(mut self, duration: Duration) -> Self {
        self.gc_time = duration;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the delay between retries.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    /// Disable retries.
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryPolicy::none();
        self
    }

    /// Whether the eviction window covers the freshness window.
    ///
    /// Not enforced; an inconsistent policy still works but may evict
    /// entries that are still fresh.
    pub fn is_consistent(&self) -> bool {
        self.gc_time >= self.stale_time
    }
}

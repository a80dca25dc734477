//! The shared query cache.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use sitekit_core::{RuntimeMode, SiteConfig};
use sitekit_data::{ErrorClass, FetchError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::entry::{AnyValue, CacheEntry, CacheStatus};
use crate::error::{QueryError, QueryResult};
use crate::inspect::{CacheSnapshot, EntrySnapshot};
use crate::key::QueryKey;
use crate::policy::QueryPolicy;

type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, QueryError>>>;

static GLOBAL: OnceLock<QueryClient> = OnceLock::new();

/// Value returned by a cache read, with how it was served.
#[derive(Debug)]
pub struct QueryOutcome<T> {
    /// The value.
    pub data: Arc<T>,
    /// Whether it was fresh, stale or freshly fetched.
    pub status: CacheStatus,
}

struct State {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashMap<QueryKey, SharedFetch>,
}

struct Inner {
    state: Mutex<State>,
    defaults: QueryPolicy,
    mode: RuntimeMode,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete_success(
        &self,
        key: &QueryKey,
        policy: &QueryPolicy,
        value: AnyValue,
        type_name: &'static str,
        started_generation: u64,
    ) {
        let now = Instant::now();
        let mut state = self.lock();
        state.in_flight.remove(key);
        state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(key.clone(), policy, now))
            .record_fetch(value, type_name, now, started_generation);
    }

    fn record_failure(&self, key: &QueryKey, policy: &QueryPolicy, class: ErrorClass, finished: bool) {
        let now = Instant::now();
        let mut state = self.lock();
        if finished {
            state.in_flight.remove(key);
        }
        state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(key.clone(), policy, now))
            .record_failure(class);
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let State { entries, in_flight } = &mut *state;
        let before = entries.len();
        entries.retain(|key, entry| in_flight.contains_key(key) || !entry.is_expired(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "evicted idle query entries");
        }
        evicted
    }
}

/// Process-wide store of asynchronous fetch results.
///
/// Cloning is cheap; clones share the same store. Reads that need a fetch
/// spawn it on the current tokio runtime, so the client must be used from
/// within one.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryPolicy::default(), RuntimeMode::default())
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("defaults", &self.inner.defaults)
            .field("mode", &self.inner.mode)
            .field("entries", &self.len())
            .finish()
    }
}

impl QueryClient {
    /// Create a client with the given default policy.
    pub fn new(defaults: QueryPolicy, mode: RuntimeMode) -> Self {
        if !defaults.is_consistent() {
            tracing::warn!(
                stale_time_ms = defaults.stale_time.as_millis() as u64,
                gc_time_ms = defaults.gc_time.as_millis() as u64,
                "query gc time is shorter than stale time"
            );
        }

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                defaults,
                mode,
            }),
        }
    }

    /// Create a client from site configuration.
    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(QueryPolicy::from_defaults(&config.query), config.mode)
    }

    /// The process-wide client.
    ///
    /// Built from default settings and `RuntimeMode::from_env()` unless
    /// [`QueryClient::init_global`] ran first.
    pub fn global() -> &'static QueryClient {
        GLOBAL.get_or_init(|| Self::new(QueryPolicy::default(), RuntimeMode::from_env()))
    }

    /// Install the process-wide client. Fails if one already exists.
    pub fn init_global(client: QueryClient) -> Result<(), QueryClient> {
        GLOBAL.set(client)
    }

    /// Default policy for reads without an explicit policy.
    pub fn default_policy(&self) -> &QueryPolicy {
        &self.inner.defaults
    }

    pub fn mode(&self) -> RuntimeMode {
        self.inner.mode
    }

    /// Read a key, fetching it if needed, using the default policy.
    pub async fn fetch_query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let policy = self.inner.defaults.clone();
        Ok(self.query_with(key, &policy, fetcher).await?.data)
    }

    /// Read a key, fetching it if needed, with an explicit policy.
    pub async fn fetch_query_with<T, F, Fut>(
        &self,
        key: QueryKey,
        policy: &QueryPolicy,
        fetcher: F,
    ) -> QueryResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Ok(self.query_with(key, policy, fetcher).await?.data)
    }

    /// Read a key with the default policy and report how it was served.
    pub async fn query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryResult<QueryOutcome<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let policy = self.inner.defaults.clone();
        self.query_with(key, &policy, fetcher).await
    }

    /// Read a key and report how it was served.
    ///
    /// - Fresh data is returned without calling `fetcher`.
    /// - Stale data is returned immediately and one background refresh is
    ///   started unless a fetch for the key is already in flight.
    /// - Without data, the caller waits for the in-flight fetch, starting
    ///   one if none exists.
    ///
    /// Fetch failures are retried according to `policy.retry`; client
    /// errors are never retried. Previous data survives failed refreshes.
    pub async fn query_with<T, F, Fut>(
        &self,
        key: QueryKey,
        policy: &QueryPolicy,
        fetcher: F,
    ) -> QueryResult<QueryOutcome<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let now = Instant::now();

        let pending = {
            let mut state = self.inner.lock();

            let expired = !state.in_flight.contains_key(&key)
                && state.entries.get(&key).is_some_and(|e| e.is_expired(now));
            if expired {
                state.entries.remove(&key);
                tracing::debug!(key = %key, "evicted idle query entry on access");
            }

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(key.clone(), policy, now));
            entry.touch(now);
            entry.apply_policy(policy);
            let fresh = entry.is_fresh(now);
            let cached = entry.data.clone();

            match cached {
                Some(value) if fresh => {
                    tracing::trace!(key = %key, "query cache hit");
                    return downcast::<T>(&key, value).map(|data| QueryOutcome {
                        data,
                        status: CacheStatus::Hit,
                    });
                }
                Some(value) => {
                    if !state.in_flight.contains_key(&key) {
                        tracing::debug!(key = %key, "serving stale data, revalidating");
                        self.start_fetch(&mut state, key.clone(), policy.clone(), fetcher);
                    }
                    return downcast::<T>(&key, value).map(|data| QueryOutcome {
                        data,
                        status: CacheStatus::Stale,
                    });
                }
                None => match state.in_flight.get(&key).cloned() {
                    Some(fetch) => fetch,
                    None => {
                        tracing::debug!(key = %key, "query cache miss");
                        self.start_fetch(&mut state, key.clone(), policy.clone(), fetcher)
                    }
                },
            }
        };

        let value = pending.await?;
        downcast::<T>(&key, value).map(|data| QueryOutcome {
            data,
            status: CacheStatus::Miss,
        })
    }

    fn start_fetch<T, F, Fut>(
        &self,
        state: &mut State,
        key: QueryKey,
        policy: QueryPolicy,
        fetcher: F,
    ) -> SharedFetch
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let inner = Arc::downgrade(&self.inner);
        let generation = state.entries.get(&key).map_or(0, |entry| entry.generation);
        let fetch = run_fetch(inner, key.clone(), policy, generation, fetcher)
            .boxed()
            .shared();
        state.in_flight.insert(key, fetch.clone());
        // Detached driver: the fetch completes and is cached even if every
        // caller goes away.
        tokio::spawn(fetch.clone());
        fetch
    }

    /// Cached data for a key, if present and of type `T`.
    pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        let entry = state.entries.get_mut(key)?;
        entry.touch(Instant::now());
        entry.data.clone()?.downcast::<T>().ok()
    }

    /// Store data for a key as if it had just been fetched.
    pub fn set_query_data<T>(&self, key: QueryKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(key, &self.inner.defaults, now))
            .record_success(Arc::new(value), type_name::<T>(), now);
    }

    /// Mark a key stale. Returns whether it was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.inner.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.invalidate();
                tracing::debug!(key = %key, "invalidated query");
                true
            }
            None => false,
        }
    }

    /// Mark a set of keys stale. Returns how many were cached.
    pub fn invalidate_many<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let mut state = self.inner.lock();
        let mut count = 0;
        for key in keys {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.invalidate();
                count += 1;
            }
        }
        tracing::debug!(count, "invalidated queries");
        count
    }

    /// Mark every key starting with `prefix` stale.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let mut state = self.inner.lock();
        let mut count = 0;
        for entry in state.entries.values_mut() {
            if entry.key.starts_with(prefix) {
                entry.invalidate();
                count += 1;
            }
        }
        tracing::debug!(prefix = %prefix, count, "invalidated queries by prefix");
        count
    }

    /// Remove a key. An in-flight fetch for it still completes and is cached.
    pub fn remove_query(&self, key: &QueryKey) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Evict entries idle for longer than their eviction window.
    ///
    /// Entries with a fetch in flight are kept.
    pub fn sweep(&self) -> usize {
        self.inner.sweep(Instant::now())
    }

    /// Run [`QueryClient::sweep`] every `interval` until the client is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.sweep(Instant::now());
            }
        })
    }

    /// Whether a fetch is in flight for a key.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache for development tooling.
    ///
    /// Returns `None` in production mode.
    pub fn inspect(&self) -> Option<CacheSnapshot> {
        if !self.inner.mode.exposes_diagnostics() {
            return None;
        }

        let now = Instant::now();
        let state = self.inner.lock();
        let mut entries: Vec<EntrySnapshot> = state
            .entries
            .values()
            .map(|entry| EntrySnapshot::capture(entry, now))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut in_flight: Vec<String> = state.in_flight.keys().map(|k| k.to_string()).collect();
        in_flight.sort();

        Some(CacheSnapshot { entries, in_flight })
    }

    /// Run a mutation exactly once. Mutations are never retried.
    pub async fn mutate<T, F, Fut>(&self, operation: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        operation().await.inspect_err(|error| {
            tracing::warn!(error = %error, class = %error.class(), "mutation failed");
        })
    }

    /// Run a mutation once and invalidate `keys` if it succeeds.
    pub async fn mutate_and_invalidate<T, F, Fut>(
        &self,
        operation: F,
        keys: &[QueryKey],
    ) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let result = self.mutate(operation).await?;
        self.invalidate_many(keys);
        Ok(result)
    }
}

async fn run_fetch<T, F, Fut>(
    inner: Weak<Inner>,
    key: QueryKey,
    policy: QueryPolicy,
    generation: u64,
    fetcher: F,
) -> Result<AnyValue, QueryError>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let mut failures: u32 = 0;
    loop {
        // A panicking fetcher counts as a failed attempt that is not retried.
        let attempt = match std::panic::catch_unwind(AssertUnwindSafe(|| fetcher())) {
            Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        let (outcome, panicked) = match attempt {
            Ok(outcome) => (outcome, false),
            Err(payload) => (Err(FetchError::Request(panic_message(payload.as_ref()))), true),
        };

        match outcome {
            Ok(value) => {
                let value: AnyValue = Arc::new(value);
                if let Some(inner) = inner.upgrade() {
                    inner.complete_success(
                        &key,
                        &policy,
                        value.clone(),
                        type_name::<T>(),
                        generation,
                    );
                }
                tracing::debug!(key = %key, attempts = failures + 1, "query fetched");
                return Ok(value);
            }
            Err(error) => {
                let retry = !panicked && policy.retry.should_retry(failures, &error);
                if let Some(inner) = inner.upgrade() {
                    inner.record_failure(&key, &policy, error.class(), !retry);
                }

                if !retry {
                    let attempts = failures + 1;
                    tracing::warn!(
                        key = %key,
                        attempts,
                        class = %error.class(),
                        error = %error,
                        "query fetch failed"
                    );
                    return Err(QueryError::from_fetch(key.as_str(), attempts, error));
                }

                let delay = policy.retry.backoff.delay_for_attempt(failures);
                failures += 1;
                tracing::debug!(key = %key, failures, error = %error, "retrying query fetch");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("fetcher panicked: {message}")
}

fn downcast<T>(key: &QueryKey, value: AnyValue) -> QueryResult<Arc<T>>
where
    T: Send + Sync + 'static,
{
    value.downcast::<T>().map_err(|_| QueryError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

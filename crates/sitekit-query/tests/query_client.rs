//! End-to-end behavior of the shared query cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use sitekit_core::RuntimeMode;
use sitekit_data::{BackoffStrategy, ErrorClass, FetchError};
use sitekit_query::{CacheStatus, QueryClient, QueryError, QueryKey, QueryPolicy};

type Fetcher<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send>;

/// Fetcher that counts invocations and returns `result` after `delay`.
fn fetcher<T>(calls: &Arc<AtomicU32>, delay: Duration, result: Result<T, FetchError>) -> Fetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    let calls = calls.clone();
    Box::new(move || {
        let calls = calls.clone();
        let result = result.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
        .boxed()
    })
}

/// Fetcher that fails `failures` times with `error`, then returns `value`.
fn flaky(calls: &Arc<AtomicU32>, failures: u32, error: FetchError, value: &'static str) -> Fetcher<String> {
    let calls = calls.clone();
    Box::new(move || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        let error = error.clone();
        async move {
            if attempt < failures {
                Err(error)
            } else {
                Ok(value.to_string())
            }
        }
        .boxed()
    })
}

async fn wait_idle(client: &QueryClient, key: &QueryKey) {
    // Sleeping lets the paused clock auto-advance past fetcher delays.
    while client.is_fetching(key) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn client() -> QueryClient {
    QueryClient::new(QueryPolicy::default(), RuntimeMode::Test)
}

// === Freshness Tests ===

#[tokio::test(start_paused = true)]
async fn test_fetcher_called_once_within_stale_time() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("user").with(1);

    for _ in 0..3 {
        let user = client
            .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("ada".to_string())))
            .await
            .unwrap();
        assert_eq!(*user, "ada");
        tokio::time::advance(Duration::from_secs(10)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_read_returns_old_value_and_refreshes_once() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("user").with(1);

    client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v1".to_string())))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    let reads = (0..5).map(|_| {
        client.query(
            key.clone(),
            fetcher(&calls, Duration::from_millis(100), Ok("v2".to_string())),
        )
    });
    let outcomes = join_all(reads).await;

    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, CacheStatus::Stale);
        assert_eq!(*outcome.data, "v1");
    }
    assert!(client.is_fetching(&key));

    wait_idle(&client, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let fresh = client
        .query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v3".to_string())))
        .await
        .unwrap();
    assert_eq!(fresh.status, CacheStatus::Hit);
    assert_eq!(*fresh.data, "v2");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_are_coalesced() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("posts");

    let reads = (0..8).map(|_| {
        client.fetch_query(
            key.clone(),
            fetcher(&calls, Duration::from_millis(50), Ok(vec![1u32, 2, 3])),
        )
    });
    let results = join_all(reads).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(*result.unwrap(), vec![1, 2, 3]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_still_populates_cache() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("slow");

    let read = client.fetch_query(
        key.clone(),
        fetcher(&calls, Duration::from_secs(1), Ok(5u32)),
    );
    let timed_out = tokio::time::timeout(Duration::from_millis(10), read).await;
    assert!(timed_out.is_err());

    wait_idle(&client, &key).await;
    assert_eq!(client.get_query_data::<u32>(&key).as_deref(), Some(&5));
}

// === Retry Tests ===

#[tokio::test(start_paused = true)]
async fn test_client_error_is_not_retried() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::from("user:1");

    let err = client
        .fetch_query(
            key.clone(),
            fetcher::<String>(&calls, Duration::ZERO, Err(FetchError::http(404, "/api/users/1"))),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(err.is_client_error());
    assert_eq!(err.class(), Some(ErrorClass::ClientError));
}

#[tokio::test(start_paused = true)]
async fn test_server_error_retried_four_attempts_total() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::from("user:1");

    let err = client
        .fetch_query(
            key.clone(),
            fetcher::<String>(&calls, Duration::ZERO, Err(FetchError::http(500, "/api/users/1"))),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match err {
        QueryError::Transient { attempts, source, .. } => {
            assert_eq!(attempts, 4);
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("expected transient error, got {other:?}"),
    }
    assert!(client.get_query_data::<String>(&key).is_none());

    let snapshot = client.inspect().unwrap();
    let entry = snapshot.entry(key.as_str()).unwrap();
    assert!(!entry.has_data);
    assert_eq!(entry.retry_count, 4);
    assert_eq!(entry.last_error_class, Some(ErrorClass::ServerError));
}

#[tokio::test(start_paused = true)]
async fn test_success_after_failures_resets_retry_count() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("flaky");

    let value = client
        .fetch_query(key.clone(), flaky(&calls, 2, FetchError::Timeout("slow".into()), "ok"))
        .await
        .unwrap();

    assert_eq!(*value, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let entry = client.inspect().unwrap().entry(key.as_str()).cloned().unwrap();
    assert_eq!(entry.retry_count, 0);
    assert_eq!(entry.last_error_class, None);
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_waits_between_attempts() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let policy = QueryPolicy::default().with_backoff(BackoffStrategy::Fixed(Duration::from_secs(1)));
    let started = tokio::time::Instant::now();

    let value = client
        .fetch_query_with(
            QueryKey::new("backoff"),
            &policy,
            flaky(&calls, 2, FetchError::http(502, "/x"), "ok"),
        )
        .await
        .unwrap();

    assert_eq!(*value, "ok");
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetcher_fails_without_wedging_key() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("count");

    let panics_first: Fetcher<u32> = {
        let calls = calls.clone();
        Box::new(move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    panic!("fetcher exploded");
                }
                Ok::<u32, FetchError>(7)
            }
            .boxed()
        })
    };

    let err = client.fetch_query::<u32, _, _>(key.clone(), panics_first).await.unwrap_err();
    assert!(matches!(err, QueryError::Transient { attempts: 1, .. }));
    assert!(err.to_string().contains("fetcher exploded"));
    assert!(!client.is_fetching(&key));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let value = client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok(7u32)))
        .await
        .unwrap();
    assert_eq!(*value, 7);
}

#[tokio::test(start_paused = true)]
async fn test_fetcher_panicking_before_returning_future() {
    let client = client();
    let key = QueryKey::new("settings");

    let broken: Fetcher<u32> = Box::new(|| -> BoxFuture<'static, Result<u32, FetchError>> {
        panic!("no future for you")
    });
    let err = client.fetch_query::<u32, _, _>(key.clone(), broken).await.unwrap_err();
    assert!(err.to_string().contains("no future for you"));
    assert!(!client.is_fetching(&key));
    assert_eq!(client.sweep(), 0);

    let calls = Arc::new(AtomicU32::new(0));
    let value = client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok(3u32)))
        .await
        .unwrap();
    assert_eq!(*value, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_stale_data() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("user").with(2);

    client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v1".to_string())))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    let stale = client
        .query(
            key.clone(),
            fetcher::<String>(&calls, Duration::ZERO, Err(FetchError::http(503, "/x"))),
        )
        .await
        .unwrap();
    assert_eq!(stale.status, CacheStatus::Stale);

    wait_idle(&client, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1 + 4);
    assert_eq!(client.get_query_data::<String>(&key).as_deref().map(String::as_str), Some("v1"));
}

// === Invalidation Tests ===

#[tokio::test(start_paused = true)]
async fn test_invalidate_triggers_refetch() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("user").with(1);

    client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v1".to_string())))
        .await
        .unwrap();
    assert!(client.invalidate(&key));
    assert_eq!(client.len(), 1);

    let outcome = client
        .query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v2".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.status, CacheStatus::Stale);

    wait_idle(&client, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.get_query_data::<String>(&key).as_deref().map(String::as_str), Some("v2"));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_during_fetch_is_not_lost() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("post").with(7);

    client.set_query_data(key.clone(), "v0".to_string());
    client.invalidate(&key);

    // Starts a slow refresh that reads the value before the next write.
    let outcome = client
        .query(key.clone(), fetcher(&calls, Duration::from_secs(1), Ok("v1".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.status, CacheStatus::Stale);
    assert!(client.is_fetching(&key));

    assert!(client.invalidate(&key));
    wait_idle(&client, &key).await;

    let outcome = client
        .query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v2".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.status, CacheStatus::Stale);
    assert_eq!(*outcome.data, "v1");

    wait_idle(&client, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.get_query_data::<String>(&key).as_deref().map(String::as_str), Some("v2"));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_unknown_key() {
    let client = client();
    assert!(!client.invalidate(&QueryKey::new("missing")));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_prefix_and_set() {
    let client = client();
    client.set_query_data(QueryKey::new("user").with(1), 1u8);
    client.set_query_data(QueryKey::new("user").with(2), 2u8);
    client.set_query_data(QueryKey::new("users"), 3u8);
    client.set_query_data(QueryKey::new("post").with(1), 4u8);

    assert_eq!(client.invalidate_prefix(&QueryKey::new("user")), 2);

    let snapshot = client.inspect().unwrap();
    assert!(!snapshot.entry(r#"["users"]"#).unwrap().is_invalidated);
    assert!(!snapshot.entry(r#"["post",1]"#).unwrap().is_invalidated);

    let keys = [QueryKey::new("users"), QueryKey::new("nope")];
    assert_eq!(client.invalidate_many(&keys), 1);
}

// === Eviction Tests ===

#[tokio::test(start_paused = true)]
async fn test_sweep_evicts_idle_entries() {
    let client = client();
    client.set_query_data(QueryKey::new("old"), 1u8);
    tokio::time::advance(Duration::from_secs(300)).await;
    client.set_query_data(QueryKey::new("new"), 2u8);
    tokio::time::advance(Duration::from_secs(300)).await;

    assert_eq!(client.sweep(), 1);
    assert!(client.get_query_data::<u8>(&QueryKey::new("old")).is_none());
    assert!(client.get_query_data::<u8>(&QueryKey::new("new")).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_lazy_eviction_on_access() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("page");

    client
        .fetch_query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v1".to_string())))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(601)).await;

    let outcome = client
        .query(key.clone(), fetcher(&calls, Duration::ZERO, Ok("v2".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.status, CacheStatus::Miss);
    assert_eq!(*outcome.data, "v2");
}

#[tokio::test(start_paused = true)]
async fn test_sweep_keeps_in_flight_entries() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("long");
    let policy = QueryPolicy::default().with_gc_time(Duration::from_secs(1));

    let read = {
        let client = client.clone();
        let key = key.clone();
        let fetch = fetcher(&calls, Duration::from_secs(5), Ok(1u8));
        tokio::spawn(async move { client.fetch_query_with(key, &policy, fetch).await })
    };
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(2)).await;

    assert!(client.is_fetching(&key));
    assert_eq!(client.sweep(), 0);

    assert_eq!(*read.await.unwrap().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper() {
    let client = client();
    client.set_query_data(QueryKey::new("idle"), 1u8);
    let sweeper = client.spawn_sweeper(Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(660)).await;

    assert!(client.is_empty());
    sweeper.abort();
}

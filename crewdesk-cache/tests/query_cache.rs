use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crewdesk_cache::{
    query_fn, CacheEvent, CacheOptions, FilterSet, QueryCache, QueryFn, QueryKeys, QueryOptions,
    RetryPolicy,
};
use crewdesk_core::{AppError, ErrorKind};
use serde_json::{json, Value};

fn cache() -> QueryCache {
    QueryCache::new(CacheOptions {
        query: QueryOptions::default(),
        retry: RetryPolicy::none(),
    })
}

fn options(stale_ms: u64) -> QueryOptions {
    QueryOptions {
        stale_time: Duration::from_millis(stale_ms),
        gc_time: Duration::from_secs(60),
        notify_errors: true,
    }
}

fn counting(calls: Arc<AtomicUsize>, value: Value) -> QueryFn {
    query_fn(move || {
        let calls = calls.clone();
        let value = value.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    })
}

fn slow(calls: Arc<AtomicUsize>, value: Value) -> QueryFn {
    query_fn(move || {
        let calls = calls.clone();
        let value = value.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    })
}

#[tokio::test]
async fn test_fresh_entry_is_served_from_cache() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = counting(calls.clone(), json!([{"id": "j1"}]));

    let first = cache.fetch(&key, options(60_000), f.clone()).await.unwrap();
    let second = cache.fetch(&key, options(60_000), f).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*second, json!([{"id": "j1"}]));
}

#[tokio::test]
async fn test_zero_stale_time_always_refetches() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = counting(calls.clone(), json!([]));

    cache.fetch(&key, options(0), f.clone()).await.unwrap();
    cache.fetch(&key, options(0), f).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_after_stale_time() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = counting(calls.clone(), json!([]));

    cache.fetch(&key, options(1_000), f.clone()).await.unwrap();
    assert!(!cache.get(&key).unwrap().is_stale);
    tokio::time::advance(Duration::from_millis(1_001)).await;
    assert!(cache.get(&key).unwrap().is_stale);
    cache.fetch(&key, options(1_000), f).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_share_one_request() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = slow(calls.clone(), json!([{"id": "j1"}]));

    let results = futures_util::future::join_all(
        (0..5).map(|_| cache.fetch(&key, options(60_000), f.clone())),
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
    assert!(!cache.is_fetching(&key));
}

#[tokio::test(start_paused = true)]
async fn test_is_fetching_while_in_flight() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = slow(calls.clone(), json!([]));

    let task = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.fetch(&key, options(0), f).await })
    };
    tokio::task::yield_now().await;
    assert!(cache.is_fetching(&key));
    assert!(cache.get(&key).unwrap().is_fetching);

    task.await.unwrap().unwrap();
    assert!(!cache.is_fetching(&key));
}

#[tokio::test]
async fn test_failure_keeps_previous_data() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    cache
        .fetch(&key, options(0), query_fn(|| async { Ok(json!(["old"])) }))
        .await
        .unwrap();

    let err = cache
        .fetch(
            &key,
            options(0),
            query_fn(|| async { Err(AppError::new(ErrorKind::Database, "boom")) }),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Database);
    let snapshot = cache.get(&key).unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&json!(["old"])));
    assert_eq!(snapshot.error.unwrap().message(), "boom");
}

#[tokio::test]
async fn test_success_clears_error() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let _ = cache
        .fetch(
            &key,
            options(0),
            query_fn(|| async { Err(AppError::new(ErrorKind::Network, "offline")) }),
        )
        .await;
    assert!(cache.get(&key).unwrap().error.is_some());

    cache
        .fetch(&key, options(0), query_fn(|| async { Ok(json!([])) }))
        .await
        .unwrap();
    assert!(cache.get(&key).unwrap().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_are_retried() {
    let cache = QueryCache::new(CacheOptions {
        query: QueryOptions::default(),
        retry: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30)),
    });
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = {
        let calls = calls.clone();
        query_fn(move || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::new(ErrorKind::Network, "offline"))
                } else {
                    Ok(json!(["ok"]))
                }
            }
        })
    };

    let data = cache.fetch(&key, options(0), f).await.unwrap();

    assert_eq!(*data, json!(["ok"]));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    let cache = QueryCache::new(CacheOptions {
        query: QueryOptions::default(),
        retry: RetryPolicy::queries(),
    });
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = {
        let calls = calls.clone();
        query_fn(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::new(ErrorKind::Permission, "denied"))
            }
        })
    };

    let err = cache.fetch(&key, options(0), f).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_by_prefix() {
    let cache = cache();
    let jobs = QueryKeys::new("jobs");
    let users = QueryKeys::new("users");
    let available = jobs.list(Some(&FilterSet::new().with("status", "AVAILABLE")));
    cache.set_data(&available, json!([]));
    cache.set_data(&jobs.detail("j1"), json!({"id": "j1"}));
    cache.set_data(&users.lists(), json!([]));

    let mut invalidated = cache.invalidate(&jobs.all());
    invalidated.sort();

    assert_eq!(invalidated.len(), 2);
    assert!(cache.get(&available).unwrap().is_stale);
    assert!(cache.get(&jobs.detail("j1")).unwrap().is_stale);
    assert!(!cache.get(&users.lists()).unwrap().is_stale);
    assert!(cache.get(&available).unwrap().has_data());
}

#[tokio::test]
async fn test_invalidate_and_refetch_only_observed_entries() {
    let cache = cache();
    let jobs = QueryKeys::new("jobs");
    let observed_calls = Arc::new(AtomicUsize::new(0));
    let idle_calls = Arc::new(AtomicUsize::new(0));
    let observed = jobs.list(Some(&FilterSet::new().with("status", "AVAILABLE")));
    let idle = jobs.detail("j1");

    let _guard = cache.observe(&observed, options(60_000));
    cache
        .fetch(&observed, options(60_000), counting(observed_calls.clone(), json!([])))
        .await
        .unwrap();
    cache
        .fetch(&idle, options(60_000), counting(idle_calls.clone(), json!({})))
        .await
        .unwrap();

    let refetched = cache.invalidate_and_refetch(&jobs.all()).await;

    assert_eq!(refetched, 1);
    assert_eq!(observed_calls.load(Ordering::SeqCst), 2);
    assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
    assert!(!cache.get(&observed).unwrap().is_stale);
    assert!(cache.get(&idle).unwrap().is_stale);
}

#[tokio::test]
async fn test_refetch_uses_stored_query_fn() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let calls = Arc::new(AtomicUsize::new(0));
    cache
        .fetch(&key, options(60_000), counting(calls.clone(), json!([])))
        .await
        .unwrap();

    assert!(cache.refetch(&key).await.unwrap().is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.refetch(&QueryKeys::new("users").lists()).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_garbage_collection_of_unobserved_entries() {
    let cache = cache();
    let jobs = QueryKeys::new("jobs");
    let gc = QueryOptions {
        stale_time: Duration::from_secs(1),
        gc_time: Duration::from_secs(10),
        notify_errors: true,
    };
    let kept = jobs.lists();
    let dropped = jobs.detail("j1");

    let _kept_guard = cache.observe(&kept, gc);
    let dropped_guard = cache.observe(&dropped, gc);
    cache.fetch(&kept, gc, query_fn(|| async { Ok(json!([])) })).await.unwrap();
    cache.fetch(&dropped, gc, query_fn(|| async { Ok(json!({})) })).await.unwrap();
    drop(dropped_guard);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.collect_garbage(), 0);

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.get(&dropped).is_none());
    assert!(cache.get(&kept).is_some());
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let mut events = cache.subscribe();

    cache.set_data(&key, json!([]));
    cache.invalidate(&QueryKeys::new("jobs").all());
    cache.remove(&key);

    assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(key.clone()));
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Invalidated(key.clone()));
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Removed(key));
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_background_gc_stops_on_cancel() {
    let cache = cache();
    let token = tokio_util::sync::CancellationToken::new();
    let handle = cache.spawn_gc(Duration::from_secs(1), token.clone());

    tokio::time::advance(Duration::from_secs(3)).await;
    token.cancel();

    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_error_hook_runs_once_per_shared_fetch() {
    let reported = Arc::new(AtomicUsize::new(0));
    let hook_count = reported.clone();
    let cache = QueryCache::with_error_hook(
        CacheOptions {
            query: QueryOptions::default(),
            retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_secs(1)),
        },
        Arc::new(move |_key: &crewdesk_cache::QueryKey, _err: &AppError| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let key = QueryKeys::new("jobs").lists();
    let f = query_fn(|| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(AppError::new(ErrorKind::Network, "offline"))
    });

    let results =
        futures_util::future::join_all((0..3).map(|_| cache.fetch(&key, options(0), f.clone()))).await;

    assert!(results.iter().all(Result::is_err));
    assert_eq!(reported.load(Ordering::SeqCst), 1);

    let quiet = QueryOptions {
        notify_errors: false,
        ..options(0)
    };
    let _ = cache.fetch(&key, quiet, f).await;
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

/// Reads `version` when called, answers 100ms later.
fn snapshot_then_wait(calls: Arc<AtomicUsize>, version: Arc<AtomicUsize>) -> QueryFn {
    query_fn(move || {
        let calls = calls.clone();
        let seen = version.load(Ordering::SeqCst);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({"version": seen}))
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_supersedes_inflight_fetch() {
    let cache = cache();
    let jobs = QueryKeys::new("jobs");
    let key = jobs.lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let version = Arc::new(AtomicUsize::new(1));
    let f = snapshot_then_wait(calls.clone(), version.clone());
    let _guard = cache.observe(&key, options(60_000));

    let early = {
        let cache = cache.clone();
        let key = key.clone();
        let f = f.clone();
        tokio::spawn(async move { cache.fetch(&key, options(60_000), f).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.is_fetching(&key));

    version.store(2, Ordering::SeqCst);
    assert_eq!(cache.invalidate_and_refetch(&jobs.all()).await, 1);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*cache.get_data(&key).unwrap(), json!({"version": 2}));
    assert!(!cache.get(&key).unwrap().is_stale);

    // The early caller still gets its own answer, which is not stored.
    assert_eq!(*early.await.unwrap().unwrap(), json!({"version": 1}));
    assert_eq!(*cache.get_data(&key).unwrap(), json!({"version": 2}));

    tokio::time::advance(Duration::from_secs(30)).await;
    let served = cache.fetch(&key, options(60_000), f).await.unwrap();
    assert_eq!(*served, json!({"version": 2}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_fetch_does_not_clear_invalidation() {
    let cache = cache();
    let jobs = QueryKeys::new("jobs");
    let key = jobs.lists();
    let calls = Arc::new(AtomicUsize::new(0));
    let version = Arc::new(AtomicUsize::new(1));
    let f = snapshot_then_wait(calls.clone(), version.clone());

    let early = {
        let cache = cache.clone();
        let key = key.clone();
        let f = f.clone();
        tokio::spawn(async move { cache.fetch(&key, options(60_000), f).await })
    };
    tokio::task::yield_now().await;
    // Unobserved: marked stale, not refetched.
    assert_eq!(cache.invalidate_and_refetch(&jobs.all()).await, 0);

    early.await.unwrap().unwrap();
    assert!(cache.get_data(&key).is_none());
    assert!(cache.get(&key).unwrap().is_stale);

    version.store(2, Ordering::SeqCst);
    let next = cache.fetch(&key, options(60_000), f).await.unwrap();
    assert_eq!(*next, json!({"version": 2}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_panicking_query_fn_releases_key() {
    let cache = cache();
    let key = QueryKeys::new("jobs").lists();
    let broken = query_fn(|| async {
        if true {
            panic!("driver bug");
        }
        Ok::<Value, AppError>(json!(null))
    });

    let err = cache.fetch(&key, options(60_000), broken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert!(!cache.is_fetching(&key));
    assert!(cache.get(&key).unwrap().error.is_some());

    let calls = Arc::new(AtomicUsize::new(0));
    let healthy = counting(calls.clone(), json!([{"id": "j1"}]));
    let data = cache.fetch_now(&key, options(60_000), healthy).await.unwrap();

    assert_eq!(*data, json!([{"id": "j1"}]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.is_fetching(&key));
    assert!(cache.get(&key).unwrap().error.is_none());
}

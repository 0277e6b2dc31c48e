//! Integration tests for the memoization cache
//!
//! Exercises the full wrapper surface end to end: LRU ordering, pluggable
//! equality, expiration timers, future-aware entries and statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;

use memo_cache::{
    memoize, memoize_async, CacheKey, EventKind, Expires, Options, StatsRegistry,
    REASON_EXPIRED,
};

/// Wraps an argument-summing function that counts real invocations.
fn counted_sum() -> (Arc<AtomicUsize>, impl Fn(&[i64]) -> i64 + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let func = move |args: &[i64]| {
        counter.fetch_add(1, Ordering::SeqCst);
        args.iter().sum()
    };
    (calls, func)
}

fn key(args: &[i64]) -> CacheKey<i64> {
    CacheKey::Args(args.to_vec())
}

// == LRU Behavior ==

#[test]
fn lru_sequence_matches_reverse_chronological_order() {
    let (calls, func) = counted_sum();
    let memoized = memoize(func, Options::new().max_size(3)).unwrap();

    memoized.call(vec![1, 2]);
    memoized.call(vec![2, 3]);
    memoized.call(vec![3, 4]);
    memoized.call(vec![4, 5]); // evicts (1,2)
    memoized.call(vec![2, 3]); // hit
    memoized.call(vec![3, 4]); // hit

    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let order: Vec<_> = memoized
        .cache()
        .snapshot()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(order, vec![key(&[3, 4]), key(&[2, 3]), key(&[4, 5])]);
}

#[test]
fn hits_return_cached_value_without_reinvocation() {
    let (calls, func) = counted_sum();
    let memoized = memoize(func, Options::new().max_size(2)).unwrap();

    let first = memoized.call(vec![10, 20]);
    let second = memoized.call(vec![10, 20]);

    assert_eq!(first, 30);
    assert_eq!(second, 30);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn eviction_always_removes_the_tail() {
    let memoized = memoize(|args: &[i64]| args[0], Options::new().max_size(2)).unwrap();

    let evicted = Arc::new(Mutex::new(Vec::new()));
    {
        let evicted = Arc::clone(&evicted);
        memoized.cache().on(
            EventKind::Delete,
            Arc::new(move |event| {
                if event.reason == Some("evicted") {
                    evicted.lock().push(event.key.clone());
                }
            }),
        );
    }

    memoized.call(vec![1]);
    memoized.call(vec![2]);
    memoized.call(vec![1]); // promote (1)
    memoized.call(vec![3]); // evicts (2), the tail

    assert_eq!(*evicted.lock(), vec![key(&[2])]);
}

// == Equality Pluggability ==

#[test]
fn structural_equality_hits_for_distinct_but_equal_objects() {
    #[derive(Clone, Debug, PartialEq)]
    struct Query {
        table: String,
        limit: usize,
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let memoized = memoize(
        move |args: &[Query]| {
            counter.fetch_add(1, Ordering::SeqCst);
            args[0].limit
        },
        Options::<Query, usize>::new().max_size(4),
    )
    .unwrap();

    // Distinct allocations, structurally equal
    let a = Query {
        table: "users".to_string(),
        limit: 10,
    };
    let b = Query {
        table: "users".to_string(),
        limit: 10,
    };

    assert_eq!(memoized.call(vec![a]), 10);
    assert_eq!(memoized.call(vec![b]), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn whole_key_comparator_replaces_per_item_scheme() {
    let (calls, func) = counted_sum();
    // Any two keys of equal length are "equal"
    let memoized = memoize(
        func,
        Options::new()
            .max_size(4)
            .is_key_equal(Arc::new(|a: &CacheKey<i64>, b: &CacheKey<i64>| {
                a.len() == b.len()
            })),
    )
    .unwrap();

    assert_eq!(memoized.call(vec![1, 2]), 3);
    assert_eq!(memoized.call(vec![7, 9]), 3); // same length: hit
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == Expiration ==

#[tokio::test]
async fn entry_expires_after_interval_with_expired_reason() {
    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new().max_size(4).expires(Expires::after_ms(100.0)),
    )
    .unwrap();

    let reasons = Arc::new(Mutex::new(Vec::new()));
    {
        let reasons = Arc::clone(&reasons);
        memoized.cache().on(
            EventKind::Delete,
            Arc::new(move |event| {
                reasons.lock().push(event.reason);
            }),
        );
    }

    memoized.call(vec![1, 2]);
    assert!(memoized.cache().has(&key(&[1, 2])));

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!memoized.cache().has(&key(&[1, 2])));
    assert_eq!(*reasons.lock(), vec![Some(REASON_EXPIRED)]);
}

#[tokio::test]
async fn should_remove_veto_then_allow() {
    let fired = Arc::new(AtomicUsize::new(0));
    let gate = Arc::clone(&fired);

    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new().max_size(4).expires(
            Expires::after_ms(80.0)
                // First boundary: false (survive); second: true (remove)
                .should_remove(Arc::new(move |_, _, _| {
                    gate.fetch_add(1, Ordering::SeqCst) >= 1
                })),
        ),
    )
    .unwrap();

    memoized.call(vec![5]);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(memoized.cache().has(&key(&[5])), "survives first boundary");

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!memoized.cache().has(&key(&[5])), "removed at second");
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deleting_entry_cancels_its_timer() {
    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new()
            .max_size(4)
            .expires(Expires::after_ms(10_000.0)),
    )
    .unwrap();

    memoized.call(vec![1]);
    let manager = memoized.expiration().expect("expiration configured");
    assert_eq!(manager.pending_timers(), 1);

    memoized.cache().delete(&key(&[1]));
    assert_eq!(manager.pending_timers(), 0);
}

// == Future-Aware Wrappers ==

#[tokio::test]
async fn rejected_call_leaves_no_entry_behind() {
    let memoized = memoize_async(
        |args: Vec<i64>| {
            async move {
                if args[0] < 0 {
                    Err("negative".to_string())
                } else {
                    Ok(args[0])
                }
            }
            .boxed()
        },
        Options::new().max_size(4),
    )
    .unwrap();

    assert_eq!(memoized.call(vec![-1]).await, Err("negative".to_string()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(memoized.cache().snapshot().is_empty());

    // A successful call afterwards is cached normally
    assert_eq!(memoized.call(vec![7]).await, Ok(7));
    assert_eq!(memoized.cache().len(), 1);
}

#[tokio::test]
async fn pending_future_expiration_clock_starts_at_resolution() {
    let memoized = memoize_async(
        |args: Vec<i64>| {
            async move {
                // Slow computation: longer than the TTL itself
                tokio::time::sleep(Duration::from_millis(120)).await;
                Ok::<_, String>(args[0])
            }
            .boxed()
        },
        Options::new()
            .max_size(4)
            .expires(Expires::after_ms(80.0).update()),
    )
    .unwrap();

    assert_eq!(memoized.call(vec![1]).await, Ok(1));

    // The TTL elapsed during computation, but scheduling only began at
    // resolution, so the entry is still here shortly after
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(memoized.cache().has(&memoized.cache().key_for(vec![1])));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!memoized.cache().has(&memoized.cache().key_for(vec![1])));
}

// == Statistics ==

#[test]
fn profile_stats_via_injected_registry() {
    let registry = Arc::new(StatsRegistry::new());
    registry.start_collecting();

    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new()
            .max_size(4)
            .stats_name("sums")
            .stats_registry(Arc::clone(&registry)),
    )
    .unwrap();

    memoized.call(vec![1, 2]); // add -> 1 call
    memoized.call(vec![1, 2]); // hit -> 1 call, 1 hit
    memoized.call(vec![3, 4]); // add -> 1 call

    let stats = registry.profile_stats("sums").unwrap();
    assert_eq!(stats.calls, 3);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.usage, "33.3333%");

    let global = registry.global_stats().unwrap();
    assert_eq!(global.calls, 3);
    assert_eq!(global.profiles.len(), 1);

    registry.stop_collecting();
    assert!(registry.profile_stats("sums").is_none());
}

#[test]
fn global_stats_lifecycle() {
    use memo_cache::{
        clear_stats, get_stats, is_collecting_stats, start_collecting_stats,
        stop_collecting_stats,
    };

    assert!(!is_collecting_stats());
    start_collecting_stats();
    assert!(is_collecting_stats());

    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new().max_size(4).stats_name("global-profile"),
    )
    .unwrap();

    memoized.call(vec![1]);
    memoized.call(vec![1]);

    let stats = get_stats("global-profile").unwrap();
    assert_eq!(stats.calls, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.usage, "50.0000%");

    clear_stats(Some("global-profile"));
    let stats = get_stats("global-profile").unwrap();
    assert_eq!(stats.calls, 0);

    stop_collecting_stats();
    assert!(!is_collecting_stats());
    assert!(get_stats("global-profile").is_none());
}

// == Wrapper Surface ==

#[test]
fn exposed_surface_is_complete() {
    let (_, func) = counted_sum();
    let memoized = memoize(
        func,
        Options::new()
            .max_size(2)
            .stats_name("surface")
            .stats_registry(Arc::new(StatsRegistry::new())),
    )
    .unwrap();

    assert!(memoized.is_memoized());
    assert!(memoized.stats().is_some());
    assert!(memoized.expiration().is_none());
    let _snapshot = memoized.options().clone(); // options stay accessible

    // The underlying function is callable directly, bypassing the cache
    let raw = memoized.fn_ref();
    assert_eq!(raw(&[2, 3]), 5);
    assert!(memoized.cache().is_empty());
}

//! Future-Aware Memoization Module
//!
//! Memoizes functions returning futures. The cached value is the shared
//! future itself, stored from the moment of insertion: concurrent callers
//! with equivalent arguments await the same in-flight computation. A
//! watcher task observes settlement — resolution emits `update` with reason
//! "resolved" (without changing position), rejection removes the entry with
//! reason "rejected" — after re-validating that the entry is still cached,
//! since it may have been evicted or cleared first.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::cache::{CacheStore, KeyBuilder};
use crate::error::Result;
use crate::expiration::ExpirationManager;
use crate::memoize::options::{Options, PredicateFn};
use crate::memoize::wrapper::{CacheHandle, REASON_FORCED};
use crate::stats::StatsManager;

/// Reason attached when a rejected future's entry is removed.
pub const REASON_REJECTED: &str = "rejected";

/// The cached value of a future-aware wrapper: a cloneable in-flight (or
/// settled) computation.
pub type SharedFuture<T, E> = Shared<BoxFuture<'static, std::result::Result<T, E>>>;

/// The wrapped future-returning user function.
pub type AsyncMemoFn<A, T, E> =
    Arc<dyn Fn(Vec<A>) -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync>;

// == Memoize Async ==
/// Wraps a future-returning `func`, caching the shared future per key.
pub fn memoize_async<A, T, E, F>(
    func: F,
    options: Options<A, SharedFuture<T, E>>,
) -> Result<MemoizedAsync<A, T, E>>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(Vec<A>) -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync + 'static,
{
    MemoizedAsync::from_parts(Arc::new(func), options)
}

// == Memoized Async ==
/// A memoized future-returning function. Cloning shares the cache.
pub struct MemoizedAsync<A, T, E> {
    func: AsyncMemoFn<A, T, E>,
    cache: Arc<Mutex<CacheStore<A, SharedFuture<T, E>>>>,
    options: Options<A, SharedFuture<T, E>>,
    key_builder: KeyBuilder<A>,
    force_update: Option<PredicateFn<A>>,
    expiration: Option<Arc<ExpirationManager<A, SharedFuture<T, E>>>>,
    stats: Option<Arc<StatsManager>>,
}

impl<A, T, E> Clone for MemoizedAsync<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            cache: Arc::clone(&self.cache),
            options: self.options.clone(),
            key_builder: self.key_builder.clone(),
            force_update: self.force_update.clone(),
            expiration: self.expiration.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<A, T, E> MemoizedAsync<A, T, E>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        func: AsyncMemoFn<A, T, E>,
        options: Options<A, SharedFuture<T, E>>,
    ) -> Result<Self> {
        let resolved = options.resolve()?;

        let cache = Arc::new(Mutex::new(CacheStore::new(
            resolved.max_size,
            resolved.equality,
        )));

        let expiration = resolved.expires.map(|spec| {
            // A pending future's expiration clock starts at resolution when
            // `update` is set
            let manager = Arc::new(ExpirationManager::new(Arc::downgrade(&cache), spec, true));
            manager.attach(&mut cache.lock());
            manager
        });

        let stats = resolved.stats_name.map(|name| {
            let manager = Arc::new(StatsManager::new(resolved.registry, name));
            manager.attach(&mut cache.lock());
            manager
        });

        Ok(Self {
            func,
            cache,
            options,
            key_builder: resolved.key_builder,
            force_update: resolved.force_update,
            expiration,
            stats,
        })
    }

    // == Call ==
    /// Invokes the memoized function and awaits its (possibly shared)
    /// result. A rejection removes the cache entry and propagates the error
    /// to every awaiter.
    pub async fn call(&self, args: Vec<A>) -> std::result::Result<T, E> {
        let key = self.key_builder.build(args.clone());

        if let Some(predicate) = &self.force_update {
            if predicate(&args) && self.cache.lock().has(&key) {
                return self.insert_entry(key, args, Some(REASON_FORCED)).await;
            }
        }

        let cached = self.cache.lock().get(&key);
        if let Some(shared) = cached {
            return shared.await;
        }

        self.insert_entry(key, args, None).await
    }

    /// Starts the computation, caches the shared future and spawns the
    /// settlement watcher.
    fn insert_entry(
        &self,
        key: crate::cache::CacheKey<A>,
        args: Vec<A>,
        reason: Option<&'static str>,
    ) -> SharedFuture<T, E> {
        let shared = (self.func)(args).shared();

        let token = self
            .cache
            .lock()
            .set_with_reason(key, shared.clone(), reason);

        let cache = Arc::downgrade(&self.cache);
        let watched = shared.clone();
        tokio::spawn(async move {
            let settled = watched.await;

            // Entry already evicted, deleted or cleared: no event, and a
            // rejection must not delete whatever lives there now
            if !token.is_alive() {
                return;
            }
            let Some(cache) = cache.upgrade() else {
                return;
            };

            let mut store = cache.lock();
            match settled {
                Ok(_) => {
                    store.touch_resolved(token.id);
                }
                Err(_) => {
                    store.delete_by_id(token.id, REASON_REJECTED);
                }
            }
        });

        shared
    }

    // == Re-Memoization ==
    /// Wraps the original underlying function with merged options (new
    /// fields win). The new wrapper starts with an empty cache.
    pub fn rememoize(&self, options: Options<A, SharedFuture<T, E>>) -> Result<Self> {
        Self::from_parts(Arc::clone(&self.func), options.merged_over(&self.options))
    }

    // == Exposed Surface ==
    /// The underlying (unmemoized) function.
    pub fn fn_ref(&self) -> AsyncMemoFn<A, T, E> {
        Arc::clone(&self.func)
    }

    /// The configuration snapshot captured at wrap time.
    pub fn options(&self) -> &Options<A, SharedFuture<T, E>> {
        &self.options
    }

    /// Marker distinguishing wrappers from plain functions.
    pub fn is_memoized(&self) -> bool {
        true
    }

    /// Handle to the backing cache store.
    pub fn cache(&self) -> CacheHandle<A, SharedFuture<T, E>> {
        CacheHandle::new(Arc::clone(&self.cache), self.key_builder.clone())
    }

    /// The expiration manager, when `expires` was configured.
    pub fn expiration(&self) -> Option<&Arc<ExpirationManager<A, SharedFuture<T, E>>>> {
        self.expiration.as_ref()
    }

    /// The stats manager, when `stats_name` was configured.
    pub fn stats(&self) -> Option<&Arc<StatsManager>> {
        self.stats.as_ref()
    }
}

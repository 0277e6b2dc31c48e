//! Memoize Wrapper Module
//!
//! Binds a cache store (plus optional expiration and stats managers) to a
//! user function, producing a drop-in replacement.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{
    CacheKey, CacheStore, EntryToken, EventKind, KeyBuilder, Listener, REASON_EXPLICIT_DELETE,
};
use crate::error::Result;
use crate::expiration::ExpirationManager;
use crate::memoize::options::{Options, PredicateFn};
use crate::stats::StatsManager;

/// Reason attached when a forced update overwrites an entry.
pub const REASON_FORCED: &str = "forced";

/// The wrapped user function.
pub type MemoFn<A, V> = Arc<dyn Fn(&[A]) -> V + Send + Sync>;

// == Memoize ==
/// Wraps `func` so that calls with equivalent arguments (per the configured
/// equality) return the cached value without re-invoking it.
///
/// Fails on invalid configuration: conflicting equality options, a zero
/// size bound, or an invalid static expiration duration.
pub fn memoize<A, V, F>(func: F, options: Options<A, V>) -> Result<Memoized<A, V>>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(&[A]) -> V + Send + Sync + 'static,
{
    Memoized::from_parts(Arc::new(func), options)
}

// == Memoized ==
/// A memoized function. Cloning shares the underlying cache.
pub struct Memoized<A, V> {
    func: MemoFn<A, V>,
    cache: Arc<Mutex<CacheStore<A, V>>>,
    options: Options<A, V>,
    key_builder: KeyBuilder<A>,
    force_update: Option<PredicateFn<A>>,
    expiration: Option<Arc<ExpirationManager<A, V>>>,
    stats: Option<Arc<StatsManager>>,
}

impl<A, V> Clone for Memoized<A, V> {
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

impl<A, V> Memoized<A, V>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(func: MemoFn<A, V>, options: Options<A, V>) -> Result<Self> {
        let resolved = options.resolve()?;

        let cache = Arc::new(Mutex::new(CacheStore::new(
            resolved.max_size,
            resolved.equality,
        )));

        let expiration = resolved.expires.map(|spec| {
            let manager = Arc::new(ExpirationManager::new(Arc::downgrade(&cache), spec, false));
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
    /// Invokes the memoized function.
    ///
    /// The underlying function runs outside the cache lock, so reentrant
    /// calls through the same wrapper are supported; a call that panics
    /// inserts nothing.
    pub fn call(&self, args: Vec<A>) -> V {
        let key = self.key_builder.build(args.clone());

        if let Some(predicate) = &self.force_update {
            if predicate(&args) && self.cache.lock().has(&key) {
                let value = (self.func)(&args);
                self.cache
                    .lock()
                    .set_with_reason(key, value.clone(), Some(REASON_FORCED));
                return value;
            }
        }

        if let Some(value) = self.cache.lock().get(&key) {
            return value;
        }

        let value = (self.func)(&args);
        self.cache.lock().set(key, value.clone());
        value
    }

    // == Re-Memoization ==
    /// Wraps the original underlying function with merged options; fields
    /// set on `options` take precedence over this wrapper's. The new
    /// wrapper starts with an empty cache.
    pub fn rememoize(&self, options: Options<A, V>) -> Result<Self> {
        Self::from_parts(Arc::clone(&self.func), options.merged_over(&self.options))
    }

    // == Exposed Surface ==
    /// The underlying (unmemoized) function.
    pub fn fn_ref(&self) -> MemoFn<A, V> {
        Arc::clone(&self.func)
    }

    /// The configuration snapshot captured at wrap time.
    pub fn options(&self) -> &Options<A, V> {
        &self.options
    }

    /// Marker distinguishing wrappers from plain functions.
    pub fn is_memoized(&self) -> bool {
        true
    }

    /// Handle to the backing cache store.
    pub fn cache(&self) -> CacheHandle<A, V> {
        CacheHandle {
            inner: Arc::clone(&self.cache),
            key_builder: self.key_builder.clone(),
        }
    }

    /// The expiration manager, when `expires` was configured.
    pub fn expiration(&self) -> Option<&Arc<ExpirationManager<A, V>>> {
        self.expiration.as_ref()
    }

    /// The stats manager, when `stats_name` was configured.
    pub fn stats(&self) -> Option<&Arc<StatsManager>> {
        self.stats.as_ref()
    }
}

// == Cache Handle ==
/// External access to a wrapper's cache store. Every method takes the store
/// lock for the duration of one operation.
pub struct CacheHandle<A, V> {
    inner: Arc<Mutex<CacheStore<A, V>>>,
    key_builder: KeyBuilder<A>,
}

impl<A, V> Clone for CacheHandle<A, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            key_builder: self.key_builder.clone(),
        }
    }
}

impl<A, V> CacheHandle<A, V>
where
    A: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        inner: Arc<Mutex<CacheStore<A, V>>>,
        key_builder: KeyBuilder<A>,
    ) -> Self {
        Self { inner, key_builder }
    }

    /// Builds the cache key for a raw argument list, running the same
    /// transform pipeline the wrapper uses.
    pub fn key_for(&self, args: Vec<A>) -> CacheKey<A> {
        self.key_builder.build(args)
    }

    /// Looks up a key, promoting a match to most-recently-used.
    pub fn get(&self, key: &CacheKey<A>) -> Option<V> {
        self.inner.lock().get(key)
    }

    /// Inserts or overwrites an entry.
    pub fn set(&self, key: CacheKey<A>, value: V) -> EntryToken {
        self.inner.lock().set(key, value)
    }

    /// Existence check without reordering or events.
    pub fn has(&self, key: &CacheKey<A>) -> bool {
        self.inner.lock().has(key)
    }

    /// Removes an entry (reason "explicit delete").
    pub fn delete(&self, key: &CacheKey<A>) -> bool {
        self.inner.lock().delete(key)
    }

    /// Removes all entries, one `delete` event each.
    pub fn clear(&self) {
        self.inner.lock().clear(REASON_EXPLICIT_DELETE)
    }

    /// Registers a lifecycle listener.
    pub fn on(&self, kind: EventKind, listener: Listener<CacheKey<A>, V>) {
        self.inner.lock().on(kind, listener)
    }

    /// Removes a lifecycle listener.
    pub fn off(&self, kind: EventKind, listener: &Listener<CacheKey<A>, V>) {
        self.inner.lock().off(kind, listener)
    }

    /// Entries head-to-tail, most-recently-used first.
    pub fn snapshot(&self) -> Vec<(CacheKey<A>, V)> {
        self.inner.lock().snapshot()
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// The configured size bound.
    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size()
    }
}

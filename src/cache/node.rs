//! Cache Node Module
//!
//! Defines the structure for individual cache entries in the LRU list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// == Cache Node ==
/// A single memoized entry: key, value and its links in the recency list.
///
/// Nodes are owned exclusively by the store's slab; `prev`/`next` are slab
/// indices. The `alive` token outlives the node so that asynchronous
/// handlers (future watchers, expiration timers) can re-validate membership
/// after the node may already have been evicted or deleted.
#[derive(Debug)]
pub struct CacheNode<K, V> {
    /// Stable identifier, unique per store for the store's lifetime
    pub id: u64,
    /// The cache key (ordered argument sequence or a transformed representative)
    pub key: K,
    /// The cached value (possibly a still-pending shared future)
    pub value: V,
    /// Slab index of the more recently used neighbour
    pub prev: Option<usize>,
    /// Slab index of the less recently used neighbour
    pub next: Option<usize>,
    /// Liveness token; flipped to false on any removal (the tombstone)
    alive: Arc<AtomicBool>,
}

impl<K, V> CacheNode<K, V> {
    // == Constructor ==
    /// Creates a detached node (no links) with a fresh liveness token.
    pub fn new(id: u64, key: K, value: V) -> Self {
        Self {
            id,
            key,
            value,
            prev: None,
            next: None,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    // == Liveness Token ==
    /// Returns a handle that observes this entry's membership in the cache.
    pub fn token(&self) -> EntryToken {
        EntryToken {
            id: self.id,
            alive: Arc::clone(&self.alive),
        }
    }

    // == Tombstone ==
    /// Marks the node as logically removed.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }

    // == Replace ==
    /// Replaces the value under a fresh identity (new id, new liveness
    /// token). The superseded token is killed, so deferred handlers still
    /// watching the old value become no-ops instead of acting on the entry
    /// that now holds the replacement.
    pub fn replace(&mut self, id: u64, value: V) -> EntryToken {
        self.kill();
        self.id = id;
        self.value = value;
        self.alive = Arc::new(AtomicBool::new(true));
        self.token()
    }
}

// == Entry Token ==
/// Handle to one entry's identity and liveness.
///
/// Returned from `CacheStore::set` so callers that defer work (promise
/// settlement, expiration timers) can later check whether the entry is
/// still cached without holding any reference into the list.
#[derive(Debug, Clone)]
pub struct EntryToken {
    /// The entry's stable id
    pub id: u64,
    alive: Arc<AtomicBool>,
}

impl EntryToken {
    /// Returns true while the entry is still present in the cache.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

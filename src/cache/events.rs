//! Cache Events Module
//!
//! Per-cache pub/sub decoupling mutation from observers (expiration, stats,
//! external listeners). Dispatch is synchronous and happens while the store
//! lock is held, so listeners must not re-enter the same cache.

use std::sync::Arc;

// == Event Kind ==
/// Lifecycle events emitted by the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new entry was inserted
    Add,
    /// An existing entry matched a lookup and is/becomes most-recent
    Hit,
    /// An entry's position or value changed (LRU promotion, overwrite,
    /// future resolution, expiration reset)
    Update,
    /// An entry was removed (explicit delete, eviction, expiration,
    /// future rejection)
    Delete,
}

impl EventKind {
    /// All event kinds, in a stable order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Add,
        EventKind::Hit,
        EventKind::Update,
        EventKind::Delete,
    ];

    fn index(self) -> usize {
        match self {
            EventKind::Add => 0,
            EventKind::Hit => 1,
            EventKind::Update => 2,
            EventKind::Delete => 3,
        }
    }
}

// == Cache Event ==
/// Event payload delivered to listeners.
#[derive(Debug, Clone)]
pub struct CacheEvent<K, V> {
    /// What happened
    pub kind: EventKind,
    /// Stable id of the affected entry
    pub id: u64,
    /// The entry's key
    pub key: K,
    /// The entry's value at the time of the event
    pub value: V,
    /// Optional human-readable reason ("evicted", "expired", ...)
    pub reason: Option<&'static str>,
}

/// Listener callback. Panics are not contained: a panicking listener aborts
/// the current operation's dispatch.
pub type Listener<K, V> = Arc<dyn Fn(&CacheEvent<K, V>) + Send + Sync>;

// == Event Emitter ==
/// Listener registry with idempotent registration and in-order dispatch.
pub struct EventEmitter<K, V> {
    listeners: [Vec<Listener<K, V>>; 4],
}

impl<K, V> Default for EventEmitter<K, V> {
    fn default() -> Self {
        Self {
            listeners: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
        }
    }
}

impl<K, V> EventEmitter<K, V> {
    // == On ==
    /// Registers a listener for one event kind.
    ///
    /// Registering the same listener (same `Arc`) twice for the same kind
    /// has no additional effect.
    pub fn on(&mut self, kind: EventKind, listener: Listener<K, V>) {
        let slot = &mut self.listeners[kind.index()];
        if !slot.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            slot.push(listener);
        }
    }

    // == Off ==
    /// Removes a previously registered listener.
    pub fn off(&mut self, kind: EventKind, listener: &Listener<K, V>) {
        self.listeners[kind.index()].retain(|l| !Arc::ptr_eq(l, listener));
    }

    // == Emit ==
    /// Invokes listeners for the event's kind synchronously, in
    /// registration order.
    pub fn emit(&self, event: &CacheEvent<K, V>) {
        for listener in &self.listeners[event.kind.index()] {
            listener(event);
        }
    }

    /// Number of listeners registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners[kind.index()].len()
    }
}

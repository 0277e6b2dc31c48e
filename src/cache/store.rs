//! Cache Store Module
//!
//! The core LRU engine: a bounded doubly-linked list of entries backed by a
//! slab, most-recently-used at head. Lookup scans from the head using the
//! configured equality strategy (arbitrary comparators cannot be hashed),
//! giving O(1) head access and O(n) worst-case lookup.

use crate::cache::equality::KeyEquality;
use crate::cache::events::{CacheEvent, EventEmitter, EventKind, Listener};
use crate::cache::key::CacheKey;
use crate::cache::node::{CacheNode, EntryToken};

/// Default reason attached to caller-initiated deletions.
pub const REASON_EXPLICIT_DELETE: &str = "explicit delete";
/// Reason attached when the tail is evicted to honor the size bound.
pub const REASON_EVICTED: &str = "evicted";

// == Cache Store ==
/// Bounded, recency-ordered storage for memoized entries.
///
/// Invariants: length never exceeds `max_size`; head is the most-recently
/// accessed or inserted entry and tail the least; with a single entry head
/// and tail coincide. Every hit or insert promotes to head, so the list is
/// a strict recency total order.
pub struct CacheStore<A, V> {
    /// Slab of nodes; `prev`/`next` are indices into this vector
    nodes: Vec<Option<CacheNode<CacheKey<A>, V>>>,
    /// Recycled slab slots
    free_list: Vec<usize>,
    /// Most recently used entry
    head: Option<usize>,
    /// Least recently used entry
    tail: Option<usize>,
    /// Current entry count
    len: usize,
    /// Maximum entry count
    max_size: usize,
    /// Key equality strategy used by lookups
    is_equal: KeyEquality<A>,
    /// Lifecycle event listeners
    emitter: EventEmitter<CacheKey<A>, V>,
    /// Next stable entry id
    next_id: u64,
}

impl<A: Clone, V: Clone> CacheStore<A, V> {
    // == Constructor ==
    /// Creates a store bounded to `max_size` entries.
    ///
    /// `max_size` is validated upstream by `Options::build`; a zero bound
    /// here is a programming error.
    pub fn new(max_size: usize, is_equal: KeyEquality<A>) -> Self {
        assert!(max_size > 0, "max size must be greater than 0");

        Self {
            nodes: Vec::with_capacity(max_size),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            max_size,
            is_equal,
            emitter: EventEmitter::default(),
            next_id: 0,
        }
    }

    // == Get ==
    /// Looks up a key, promoting a match to most-recently-used.
    ///
    /// A head match emits `hit` only (already most recent); a non-head
    /// match is relinked to head and emits `hit` then `update`. A miss
    /// returns `None` and emits nothing.
    pub fn get(&mut self, key: &CacheKey<A>) -> Option<V> {
        let idx = self.find(key)?;
        let at_head = self.head == Some(idx);

        if !at_head {
            self.move_to_front(idx);
        }

        let (id, key, value) = self.snapshot_node(idx);
        self.emit(EventKind::Hit, id, &key, &value, None);
        if !at_head {
            self.emit(EventKind::Update, id, &key, &value, None);
        }
        Some(value)
    }

    // == Set ==
    /// Inserts or overwrites an entry, making it most-recently-used.
    ///
    /// See [`set_with_reason`](Self::set_with_reason); the reason on the
    /// overwrite `update` event is empty.
    pub fn set(&mut self, key: CacheKey<A>, value: V) -> EntryToken {
        self.set_with_reason(key, value, None)
    }

    /// Inserts or overwrites an entry with an explicit `update` reason.
    ///
    /// An existing match has its value replaced in place under a fresh id
    /// and liveness token (relinked to head first if needed) and emits
    /// `update`; the superseded token is killed. Otherwise a new node is linked
    /// at head; if the store now exceeds its bound the tail is evicted
    /// (emitting `delete` with reason "evicted") before `add` is emitted
    /// for the new entry.
    pub fn set_with_reason(
        &mut self,
        key: CacheKey<A>,
        value: V,
        reason: Option<&'static str>,
    ) -> EntryToken {
        if let Some(idx) = self.find(&key) {
            if self.head != Some(idx) {
                self.move_to_front(idx);
            }
            // The replacement gets a fresh id and token; handlers bound to
            // the superseded value (future watchers, timers) must not reach
            // the entry through their stale id
            let id = self.next_id;
            self.next_id += 1;
            let node = self.nodes[idx].as_mut().expect("linked node present");
            let token = node.replace(id, value);

            let (id, key, value) = self.snapshot_node(idx);
            self.emit(EventKind::Update, id, &key, &value, reason);
            return token;
        }

        let id = self.next_id;
        self.next_id += 1;

        let idx = self.alloc_slot();
        self.nodes[idx] = Some(CacheNode::new(id, key, value));
        self.push_front(idx);
        self.len += 1;

        let token = self.nodes[idx].as_ref().expect("new node present").token();

        if self.len > self.max_size {
            self.evict_tail();
        }

        let (id, key, value) = self.snapshot_node(idx);
        self.emit(EventKind::Add, id, &key, &value, None);
        token
    }

    // == Has ==
    /// Existence check without reordering or events.
    pub fn has(&self, key: &CacheKey<A>) -> bool {
        self.find(key).is_some()
    }

    // == Delete ==
    /// Removes an entry, emitting `delete` with reason "explicit delete".
    pub fn delete(&mut self, key: &CacheKey<A>) -> bool {
        self.delete_with_reason(key, REASON_EXPLICIT_DELETE)
    }

    /// Removes an entry, emitting `delete` with the given reason.
    pub fn delete_with_reason(&mut self, key: &CacheKey<A>, reason: &'static str) -> bool {
        match self.find(key) {
            Some(idx) => {
                self.remove_at(idx, reason);
                true
            }
            None => false,
        }
    }

    // == Clear ==
    /// Removes all entries.
    ///
    /// Emits one `delete` event per removed node (head to tail) so that
    /// listeners can release associated resources, then resets the list.
    pub fn clear(&mut self, reason: &'static str) {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked node present");
            node.kill();
            let (id, key, value) = self.snapshot_node(idx);
            cursor = node.next;
            self.emit(EventKind::Delete, id, &key, &value, Some(reason));
        }

        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    // == Snapshot ==
    /// Head-to-tail traversal, most-recently-used first. Non-mutating.
    pub fn snapshot(&self) -> Vec<(CacheKey<A>, V)> {
        let mut entries = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked node present");
            entries.push((node.key.clone(), node.value.clone()));
            cursor = node.next;
        }
        entries
    }

    // == Size ==
    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The configured size bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // == Events ==
    /// Registers a lifecycle listener (idempotent per `Arc`).
    pub fn on(&mut self, kind: EventKind, listener: Listener<CacheKey<A>, V>) {
        self.emitter.on(kind, listener);
    }

    /// Removes a lifecycle listener.
    pub fn off(&mut self, kind: EventKind, listener: &Listener<CacheKey<A>, V>) {
        self.emitter.off(kind, listener);
    }

    // == By-Id Operations ==
    // Used by the expiration manager and future watchers, which identify
    // entries by stable id rather than by key.

    /// True while an entry with this id is cached.
    pub fn contains_id(&self, id: u64) -> bool {
        self.find_id(id).is_some()
    }

    /// Clones the key and value of an entry by id.
    pub fn get_by_id(&self, id: u64) -> Option<(CacheKey<A>, V)> {
        let idx = self.find_id(id)?;
        let node = self.nodes[idx].as_ref().expect("linked node present");
        Some((node.key.clone(), node.value.clone()))
    }

    /// Promotes an entry to head (if not already there) and emits `update`
    /// with the given reason. Returns false for an unknown id.
    pub fn refresh(&mut self, id: u64, reason: &'static str) -> bool {
        let Some(idx) = self.find_id(id) else {
            return false;
        };
        if self.head != Some(idx) {
            self.move_to_front(idx);
        }
        let (id, key, value) = self.snapshot_node(idx);
        self.emit(EventKind::Update, id, &key, &value, Some(reason));
        true
    }

    /// Emits `update` with reason "resolved" without changing the entry's
    /// position. Returns false for an unknown id.
    pub fn touch_resolved(&mut self, id: u64) -> bool {
        let Some(idx) = self.find_id(id) else {
            return false;
        };
        let (id, key, value) = self.snapshot_node(idx);
        self.emit(EventKind::Update, id, &key, &value, Some("resolved"));
        true
    }

    /// Removes an entry by id, emitting `delete` with the given reason.
    pub fn delete_by_id(&mut self, id: u64, reason: &'static str) -> bool {
        match self.find_id(id) {
            Some(idx) => {
                self.remove_at(idx, reason);
                true
            }
            None => false,
        }
    }

    // == Internal: Lookup ==
    fn find(&self, key: &CacheKey<A>) -> Option<usize> {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked node present");
            if self.is_equal.matches(key, &node.key) {
                return Some(idx);
            }
            cursor = node.next;
        }
        None
    }

    fn find_id(&self, id: u64) -> Option<usize> {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked node present");
            if node.id == id {
                return Some(idx);
            }
            cursor = node.next;
        }
        None
    }

    // == Internal: Linked List ==
    fn push_front(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn evict_tail(&mut self) {
        if let Some(tail_idx) = self.tail {
            self.remove_at(tail_idx, REASON_EVICTED);
        }
    }

    fn remove_at(&mut self, idx: usize, reason: &'static str) {
        self.unlink(idx);
        if let Some(node) = self.nodes[idx].take() {
            node.kill();
            self.free_list.push(idx);
            self.len -= 1;
            self.emit(EventKind::Delete, node.id, &node.key, &node.value, Some(reason));
        }
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    // == Internal: Events ==
    fn snapshot_node(&self, idx: usize) -> (u64, CacheKey<A>, V) {
        let node = self.nodes[idx].as_ref().expect("linked node present");
        (node.id, node.key.clone(), node.value.clone())
    }

    fn emit(
        &self,
        kind: EventKind,
        id: u64,
        key: &CacheKey<A>,
        value: &V,
        reason: Option<&'static str>,
    ) {
        self.emit_event(&CacheEvent {
            kind,
            id,
            key: key.clone(),
            value: value.clone(),
            reason,
        });
    }

    fn emit_event(&self, event: &CacheEvent<CacheKey<A>, V>) {
        self.emitter.emit(event);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn store(max: usize) -> CacheStore<u32, &'static str> {
        CacheStore::new(max, KeyEquality::default())
    }

    fn key(args: &[u32]) -> CacheKey<u32> {
        CacheKey::Args(args.to_vec())
    }

    /// Collects (kind, reason) pairs for all event kinds.
    fn record_events(
        store: &mut CacheStore<u32, &'static str>,
    ) -> Arc<Mutex<Vec<(EventKind, Option<&'static str>)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let log = Arc::clone(&log);
            store.on(
                kind,
                Arc::new(move |event| {
                    log.lock().push((event.kind, event.reason));
                }),
            );
        }
        log
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(10);

        store.set(key(&[1, 2]), "a");
        assert_eq!(store.get(&key(&[1, 2])), Some("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_miss_returns_none() {
        let mut store = store(10);
        assert_eq!(store.get(&key(&[9])), None);
    }

    #[test]
    fn test_store_overwrite_keeps_single_entry() {
        let mut store = store(10);

        store.set(key(&[1]), "a");
        store.set(key(&[1]), "b");

        assert_eq!(store.get(&key(&[1])), Some("b"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_eviction_removes_exactly_the_tail() {
        let mut store = store(2);

        store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");
        store.set(key(&[3]), "c"); // evicts [1]

        assert_eq!(store.len(), 2);
        assert!(!store.has(&key(&[1])));
        assert!(store.has(&key(&[2])));
        assert!(store.has(&key(&[3])));
    }

    #[test]
    fn test_store_get_promotes_to_head() {
        let mut store = store(2);

        store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");
        store.get(&key(&[1])); // [1] now most recent
        store.set(key(&[3]), "c"); // evicts [2]

        assert!(store.has(&key(&[1])));
        assert!(!store.has(&key(&[2])));
    }

    #[test]
    fn test_store_has_does_not_reorder() {
        let mut store = store(2);

        store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");
        assert!(store.has(&key(&[1]))); // no promotion
        store.set(key(&[3]), "c"); // still evicts [1]

        assert!(!store.has(&key(&[1])));
    }

    #[test]
    fn test_store_snapshot_most_recent_first() {
        let mut store = store(3);

        store.set(key(&[1, 2]), "a");
        store.set(key(&[2, 3]), "b");
        store.set(key(&[3, 4]), "c");
        store.set(key(&[4, 5]), "d"); // evicts [1,2]
        store.get(&key(&[2, 3]));
        store.get(&key(&[3, 4]));

        let order: Vec<_> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![key(&[3, 4]), key(&[2, 3]), key(&[4, 5])]);
    }

    #[test]
    fn test_store_delete() {
        let mut store = store(10);

        store.set(key(&[1]), "a");
        assert!(store.delete(&key(&[1])));
        assert!(!store.delete(&key(&[1])));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_clear_empties_and_reports_each_entry() {
        let mut store = store(10);
        store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");

        let log = record_events(&mut store);
        store.clear(REASON_EXPLICIT_DELETE);

        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
        assert_eq!(
            *log.lock(),
            vec![
                (EventKind::Delete, Some(REASON_EXPLICIT_DELETE)),
                (EventKind::Delete, Some(REASON_EXPLICIT_DELETE)),
            ]
        );
    }

    #[test]
    fn test_store_event_sequence_for_miss_then_hits() {
        let mut store = store(2);
        let log = record_events(&mut store);

        store.set(key(&[1]), "a"); // add
        store.set(key(&[2]), "b"); // add
        store.get(&key(&[2])); // head hit: hit only
        store.get(&key(&[1])); // non-head hit: hit + update
        store.set(key(&[3]), "c"); // delete(evicted) + add

        assert_eq!(
            *log.lock(),
            vec![
                (EventKind::Add, None),
                (EventKind::Add, None),
                (EventKind::Hit, None),
                (EventKind::Hit, None),
                (EventKind::Update, None),
                (EventKind::Delete, Some(REASON_EVICTED)),
                (EventKind::Add, None),
            ]
        );
    }

    #[test]
    fn test_store_overwrite_emits_update_with_reason() {
        let mut store = store(2);
        store.set(key(&[1]), "a");

        let log = record_events(&mut store);
        store.set_with_reason(key(&[1]), "b", Some("forced"));

        assert_eq!(*log.lock(), vec![(EventKind::Update, Some("forced"))]);
    }

    #[test]
    fn test_store_token_liveness_tracks_eviction() {
        let mut store = store(1);

        let token = store.set(key(&[1]), "a");
        assert!(token.is_alive());

        store.set(key(&[2]), "b"); // evicts [1]
        assert!(!token.is_alive());
    }

    #[test]
    fn test_store_overwrite_supersedes_old_token() {
        let mut store = store(2);

        let old = store.set(key(&[1]), "a");
        let new = store.set(key(&[1]), "b");

        assert!(!old.is_alive());
        assert!(new.is_alive());
        assert_ne!(old.id, new.id);

        // A stale by-id handle no longer reaches the fresh entry
        assert!(!store.delete_by_id(old.id, "rejected"));
        assert!(!store.touch_resolved(old.id));
        assert_eq!(store.get_by_id(new.id), Some((key(&[1]), "b")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_by_id_refresh_and_delete() {
        let mut store = store(3);

        let token = store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");

        assert!(store.contains_id(token.id));
        assert_eq!(store.get_by_id(token.id), Some((key(&[1]), "a")));

        // Refresh promotes back to head
        assert!(store.refresh(token.id, "expiration reset"));
        let order: Vec<_> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![key(&[1]), key(&[2])]);

        assert!(store.delete_by_id(token.id, "expired"));
        assert!(!store.contains_id(token.id));
        assert!(!store.refresh(token.id, "expiration reset"));
        assert!(!store.touch_resolved(token.id));
    }

    #[test]
    fn test_store_touch_resolved_keeps_position() {
        let mut store = store(3);

        let token = store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");

        let log = record_events(&mut store);
        assert!(store.touch_resolved(token.id));

        // Event fired, position unchanged ([2] still head)
        assert_eq!(*log.lock(), vec![(EventKind::Update, Some("resolved"))]);
        let order: Vec<_> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![key(&[2]), key(&[1])]);
    }

    #[test]
    fn test_store_max_size_one() {
        let mut store = store(1);

        store.set(key(&[1]), "a");
        store.set(key(&[2]), "b");

        assert_eq!(store.len(), 1);
        assert!(!store.has(&key(&[1])));
        assert_eq!(store.get(&key(&[2])), Some("b"));
    }

    #[test]
    fn test_store_slot_reuse_after_delete() {
        let mut store = store(2);

        store.set(key(&[1]), "a");
        store.delete(&key(&[1]));
        store.set(key(&[2]), "b");
        store.set(key(&[3]), "c");
        store.set(key(&[4]), "d");

        assert_eq!(store.len(), 2);
        let order: Vec<_> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec![key(&[4]), key(&[3])]);
    }
}

//! Expiration Module
//!
//! Optional per-entry time-to-live behavior layered on the cache store via
//! event subscription. Each qualifying entry gets its own timer task; firing
//! re-validates that the entry still exists before acting, since it may have
//! been deleted, evicted or cleared in the interim.
//!
//! Per-entry state machine:
//! unscheduled -> scheduled -> (fired -> removed | fired -> rescheduled)
//! -> unscheduled

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cache::{CacheKey, CacheStore, EventKind};
use crate::error::{MemoError, Result};

/// Reason attached when a timer fires and the entry is removed.
pub const REASON_EXPIRED: &str = "expired";
/// Reason attached when `should_remove` vetoes removal and the entry is
/// renewed instead.
pub const REASON_EXPIRATION_RESET: &str = "expiration reset";

/// Computes a duration in milliseconds from an entry.
pub type DurationFn<A, V> = Arc<dyn Fn(&CacheKey<A>, &V) -> f64 + Send + Sync>;
/// Decides whether an entry should skip expiration entirely.
pub type PersistFn<A, V> = Arc<dyn Fn(&CacheKey<A>, &V) -> bool + Send + Sync>;
/// Decides at fire time whether the entry is removed (true) or renewed;
/// receives the instant the timer fired.
pub type RemoveFn<A, V> = Arc<dyn Fn(&CacheKey<A>, &V, Instant) -> bool + Send + Sync>;

// == Expire After ==
/// How long an entry lives: a fixed duration or one computed per entry.
pub enum ExpireAfter<A, V> {
    /// Fixed duration in milliseconds
    Millis(f64),
    /// Computed from (key, value) at scheduling time
    Compute(DurationFn<A, V>),
}

impl<A, V> Clone for ExpireAfter<A, V> {
    fn clone(&self) -> Self {
        match self {
            ExpireAfter::Millis(ms) => ExpireAfter::Millis(*ms),
            ExpireAfter::Compute(f) => ExpireAfter::Compute(Arc::clone(f)),
        }
    }
}

// == Expires ==
/// Expiration configuration captured at wrap time.
pub struct Expires<A, V> {
    /// Entry lifetime
    pub after: ExpireAfter<A, V>,
    /// When returning true, the entry is never scheduled (default: schedule)
    pub should_persist: Option<PersistFn<A, V>>,
    /// When present and returning false at fire time, the entry is renewed
    /// instead of removed
    pub should_remove: Option<RemoveFn<A, V>>,
    /// Reset the timer whenever the entry is hit
    pub update: bool,
}

impl<A, V> Clone for Expires<A, V> {
    fn clone(&self) -> Self {
        Self {
            after: self.after.clone(),
            should_persist: self.should_persist.clone(),
            should_remove: self.should_remove.clone(),
            update: self.update,
        }
    }
}

impl<A, V> Expires<A, V> {
    // == Constructors ==
    /// Expire entries a fixed number of milliseconds after scheduling.
    pub fn after_ms(ms: f64) -> Self {
        Self {
            after: ExpireAfter::Millis(ms),
            should_persist: None,
            should_remove: None,
            update: false,
        }
    }

    /// Expire entries after a per-entry computed number of milliseconds.
    pub fn computed(f: DurationFn<A, V>) -> Self {
        Self {
            after: ExpireAfter::Compute(f),
            should_persist: None,
            should_remove: None,
            update: false,
        }
    }

    /// Skip scheduling for entries the predicate marks persistent.
    pub fn should_persist(mut self, f: PersistFn<A, V>) -> Self {
        self.should_persist = Some(f);
        self
    }

    /// Consult the predicate at fire time; false renews instead of removing.
    pub fn should_remove(mut self, f: RemoveFn<A, V>) -> Self {
        self.should_remove = Some(f);
        self
    }

    /// Also reset the timer on every cache hit.
    pub fn update(mut self) -> Self {
        self.update = true;
        self
    }

    /// Validates a statically configured duration at build time.
    pub(crate) fn validate(&self) -> Result<()> {
        if let ExpireAfter::Millis(ms) = self.after {
            validate_millis(ms)?;
        }
        Ok(())
    }
}

/// Checks that a duration is a finite, non-negative number of milliseconds.
fn validate_millis(ms: f64) -> Result<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(MemoError::InvalidExpiration(ms));
    }
    Ok(Duration::from_secs_f64(ms / 1000.0))
}

// == Expiration Manager ==
/// Owns the per-entry timers and reacts to cache events.
///
/// Holds only a `Weak` reference to the cache, so pending timers never keep
/// a dropped cache (or the process) alive.
/// One pending timer. The generation disambiguates a legitimate fire from
/// a timer that was superseded after its sleep had already completed
/// (`abort` cannot stop a task past its last await).
struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct ExpirationManager<A, V> {
    cache: Weak<Mutex<CacheStore<A, V>>>,
    spec: Expires<A, V>,
    /// entry id -> pending timer
    timers: Mutex<HashMap<u64, TimerSlot>>,
    /// Source of `TimerSlot::generation` values, unique per scheduling
    timer_generation: AtomicU64,
    /// Entries whose first scheduling waits for their "resolved" update
    pending_resolve: Mutex<HashSet<u64>>,
    /// Set for future-aware wrappers with `update`: a pending future's clock
    /// starts at resolution, not insertion
    defer_until_resolved: bool,
}

impl<A, V> ExpirationManager<A, V>
where
    A: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(
        cache: Weak<Mutex<CacheStore<A, V>>>,
        spec: Expires<A, V>,
        defer_until_resolved: bool,
    ) -> Self {
        Self {
            cache,
            spec,
            timers: Mutex::new(HashMap::new()),
            timer_generation: AtomicU64::new(0),
            pending_resolve: Mutex::new(HashSet::new()),
            defer_until_resolved,
        }
    }

    // == Attach ==
    /// Subscribes the manager to the store's lifecycle events. Called once
    /// during wrapper construction, before the store is shared.
    pub fn attach(self: &Arc<Self>, store: &mut CacheStore<A, V>) {
        let manager = Arc::clone(self);
        store.on(
            EventKind::Add,
            Arc::new(move |event| {
                if manager.defer_until_resolved && manager.spec.update {
                    manager.pending_resolve.lock().insert(event.id);
                } else {
                    manager.schedule(event.id, &event.key, &event.value);
                }
            }),
        );

        if self.spec.update {
            let manager = Arc::clone(self);
            store.on(
                EventKind::Hit,
                Arc::new(move |event| {
                    manager.schedule(event.id, &event.key, &event.value);
                }),
            );
        }

        if self.defer_until_resolved && self.spec.update {
            let manager = Arc::clone(self);
            store.on(
                EventKind::Update,
                Arc::new(move |event| {
                    if event.reason == Some("resolved")
                        && manager.pending_resolve.lock().remove(&event.id)
                    {
                        manager.schedule(event.id, &event.key, &event.value);
                    }
                }),
            );
        }

        let manager = Arc::clone(self);
        store.on(
            EventKind::Delete,
            Arc::new(move |event| {
                manager.cancel(event.id);
            }),
        );
    }

    // == Schedule ==
    /// Starts (or resets) the timer for an entry.
    ///
    /// A computed duration must be a finite number of milliseconds >= 0;
    /// anything else panics synchronously, surfacing from inside the cache
    /// call that triggered scheduling.
    fn schedule(self: &Arc<Self>, id: u64, key: &CacheKey<A>, value: &V) {
        if let Some(persist) = &self.spec.should_persist {
            if persist(key, value) {
                trace!(id, "entry marked persistent, not scheduling expiration");
                return;
            }
        }

        let ms = match &self.spec.after {
            ExpireAfter::Millis(ms) => *ms,
            ExpireAfter::Compute(f) => f(key, value),
        };
        let duration = match validate_millis(ms) {
            Ok(duration) => duration,
            Err(err) => panic!("{err}"),
        };

        debug!(id, ms, "scheduling expiration timer");

        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            manager.fire(id, generation);
        });

        // Resetting an existing timer replaces it
        if let Some(old) = self
            .timers
            .lock()
            .insert(id, TimerSlot { generation, handle })
        {
            old.handle.abort();
        }
    }

    // == Fire ==
    /// Timer callback: re-validates the entry and removes or renews it.
    ///
    /// The generation check runs under the store lock, where `schedule`
    /// also runs (from event listeners): a reset that raced a fire whose
    /// sleep had already completed wins, and the stale fire is a no-op.
    fn fire(self: &Arc<Self>, id: u64, generation: u64) {
        let Some(cache) = self.cache.upgrade() else {
            self.remove_current_timer(id, generation);
            return;
        };

        let renewed = {
            let mut store = cache.lock();
            // Superseded timer: the entry's timer was reset while this
            // fire was in flight
            if !self.remove_current_timer(id, generation) {
                return;
            }
            // Stale timer: the entry was removed while we slept
            let Some((key, value)) = store.get_by_id(id) else {
                return;
            };

            match &self.spec.should_remove {
                Some(should_remove) if !should_remove(&key, &value, Instant::now()) => {
                    debug!(id, "expiration vetoed, renewing entry");
                    store.refresh(id, REASON_EXPIRATION_RESET);
                    Some((key, value))
                }
                _ => {
                    debug!(id, "entry expired");
                    store.delete_by_id(id, REASON_EXPIRED);
                    None
                }
            }
        };

        // Reschedule outside the store lock
        if let Some((key, value)) = renewed {
            self.schedule(id, &key, &value);
        }
    }

    // == Cancel ==
    /// Drops any pending timer for an entry (delete, eviction, rejection).
    fn cancel(&self, id: u64) {
        if let Some(slot) = self.timers.lock().remove(&id) {
            slot.handle.abort();
            trace!(id, "expiration timer cancelled");
        }
        self.pending_resolve.lock().remove(&id);
    }

    /// Removes the pending timer for `id` if `generation` is still its
    /// current one. Returns false for a superseded or already-removed timer.
    fn remove_current_timer(&self, id: u64, generation: u64) -> bool {
        let mut timers = self.timers.lock();
        match timers.get(&id) {
            Some(slot) if slot.generation == generation => {
                timers.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Number of pending timers (test visibility).
    pub fn pending_timers(&self) -> usize {
        self.timers.lock().len()
    }
}

impl<A, V> Drop for ExpirationManager<A, V> {
    fn drop(&mut self) {
        for (_, slot) in self.timers.lock().drain() {
            slot.handle.abort();
        }
    }
}

//! Cache Statistics Module
//!
//! Passive per-profile call/hit counters built purely from `add`/`hit`
//! event subscriptions. Collection is off by default and toggled process-
//! wide; disabling forgets history (counters are zeroed, not paused).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheStore, EventKind};

// == Counters ==
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    calls: u64,
    hits: u64,
}

// == Profile Stats ==
/// Snapshot of one profile's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    /// Profile name
    pub name: String,
    /// Lookups attributed to the profile (every add or hit)
    pub calls: u64,
    /// Lookups that were served from the cache
    pub hits: u64,
    /// Hit ratio as a 4-decimal percentage string ("0.0000%" for no calls)
    pub usage: String,
}

// == Global Stats ==
/// Aggregation across all profiles, with per-profile breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    /// Total calls across profiles
    pub calls: u64,
    /// Total hits across profiles
    pub hits: u64,
    /// Aggregate hit ratio, formatted like [`ProfileStats::usage`]
    pub usage: String,
    /// Per-profile breakdown, sorted by profile name
    pub profiles: Vec<ProfileStats>,
}

/// Formats hits/calls as a 4-decimal percentage string.
fn usage(calls: u64, hits: u64) -> String {
    if calls == 0 {
        "0.0000%".to_string()
    } else {
        format!("{:.4}%", (hits as f64 / calls as f64) * 100.0)
    }
}

// == Stats Registry ==
/// Profile-name -> counter storage with the process-wide collection toggle.
///
/// A registry is injectable into `Options` for isolated testing; the global
/// helper functions below operate on a shared default instance.
#[derive(Default)]
pub struct StatsRegistry {
    collecting: AtomicBool,
    profiles: Mutex<HashMap<String, Counters>>,
    warned: AtomicBool,
}

impl StatsRegistry {
    // == Constructor ==
    /// Creates a registry with collection disabled.
    pub fn new() -> Self {
        Self::default()
    }

    // == Lifecycle ==
    /// Enables counting for all known profiles.
    pub fn start_collecting(&self) {
        self.collecting.store(true, Ordering::SeqCst);
    }

    /// Disables counting and zeroes all counters.
    pub fn stop_collecting(&self) {
        self.collecting.store(false, Ordering::SeqCst);
        for counters in self.profiles.lock().values_mut() {
            *counters = Counters::default();
        }
    }

    /// Whether collection is currently enabled.
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Relaxed)
    }

    // == Recording ==
    /// Makes a profile known to the registry (its counters start at zero).
    pub fn register_profile(&self, name: &str) {
        self.profiles.lock().entry(name.to_string()).or_default();
    }

    pub(crate) fn record_call(&self, name: &str) {
        if !self.is_collecting() {
            return;
        }
        self.profiles.lock().entry(name.to_string()).or_default().calls += 1;
    }

    pub(crate) fn record_hit(&self, name: &str) {
        if !self.is_collecting() {
            return;
        }
        let mut profiles = self.profiles.lock();
        let counters = profiles.entry(name.to_string()).or_default();
        counters.calls += 1;
        counters.hits += 1;
    }

    // == Queries ==
    /// Counters for one profile, or `None` (with a one-time warning) while
    /// collection is disabled or the profile is unknown.
    pub fn profile_stats(&self, name: &str) -> Option<ProfileStats> {
        if !self.collection_queryable() {
            return None;
        }
        let profiles = self.profiles.lock();
        let counters = profiles.get(name)?;
        Some(ProfileStats {
            name: name.to_string(),
            calls: counters.calls,
            hits: counters.hits,
            usage: usage(counters.calls, counters.hits),
        })
    }

    /// Sums across all profiles, or `None` while collection is disabled.
    pub fn global_stats(&self) -> Option<GlobalStats> {
        if !self.collection_queryable() {
            return None;
        }
        let profiles = self.profiles.lock();
        let mut breakdown: Vec<ProfileStats> = profiles
            .iter()
            .map(|(name, counters)| ProfileStats {
                name: name.clone(),
                calls: counters.calls,
                hits: counters.hits,
                usage: usage(counters.calls, counters.hits),
            })
            .collect();
        breakdown.sort_by(|a, b| a.name.cmp(&b.name));

        let calls = breakdown.iter().map(|p| p.calls).sum();
        let hits = breakdown.iter().map(|p| p.hits).sum();
        Some(GlobalStats {
            calls,
            hits,
            usage: usage(calls, hits),
            profiles: breakdown,
        })
    }

    /// Zeroes one profile's counters, or all of them.
    pub fn clear(&self, name: Option<&str>) {
        let mut profiles = self.profiles.lock();
        match name {
            Some(name) => {
                if let Some(counters) = profiles.get_mut(name) {
                    *counters = Counters::default();
                }
            }
            None => {
                for counters in profiles.values_mut() {
                    *counters = Counters::default();
                }
            }
        }
    }

    fn collection_queryable(&self) -> bool {
        if self.is_collecting() {
            return true;
        }
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!("stats queried while collection is disabled; call start_collecting_stats() first");
        }
        false
    }
}

// == Stats Manager ==
/// Binds one wrapper's cache to a named profile in a registry.
pub struct StatsManager {
    registry: Arc<StatsRegistry>,
    profile: String,
}

impl StatsManager {
    // == Constructor ==
    pub fn new(registry: Arc<StatsRegistry>, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        registry.register_profile(&profile);
        Self { registry, profile }
    }

    /// The profile this manager reports into.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// This profile's current counters (subject to the collection toggle).
    pub fn stats(&self) -> Option<ProfileStats> {
        self.registry.profile_stats(&self.profile)
    }

    // == Attach ==
    /// Subscribes the counting listeners: `add` counts a call, `hit` counts
    /// a call and a hit. A `set`-driven `update` counts nothing.
    ///
    /// When collection is disabled the listeners reduce to one atomic load.
    pub fn attach<A, V>(self: &Arc<Self>, store: &mut CacheStore<A, V>)
    where
        A: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let manager = Arc::clone(self);
        store.on(
            EventKind::Add,
            Arc::new(move |_| {
                manager.registry.record_call(&manager.profile);
            }),
        );

        let manager = Arc::clone(self);
        store.on(
            EventKind::Hit,
            Arc::new(move |_| {
                manager.registry.record_hit(&manager.profile);
            }),
        );
    }
}

// == Global Registry ==
/// The process-wide default registry used by the helper functions and by
/// wrappers built without an explicit registry.
pub fn default_registry() -> &'static Arc<StatsRegistry> {
    static GLOBAL: OnceLock<Arc<StatsRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(StatsRegistry::new()))
}

/// Enables stats collection on the default registry.
pub fn start_collecting_stats() {
    default_registry().start_collecting();
}

/// Disables stats collection on the default registry and zeroes counters.
pub fn stop_collecting_stats() {
    default_registry().stop_collecting();
}

/// Whether the default registry is collecting.
pub fn is_collecting_stats() -> bool {
    default_registry().is_collecting()
}

/// One profile's counters from the default registry.
pub fn get_stats(profile: &str) -> Option<ProfileStats> {
    default_registry().profile_stats(profile)
}

/// Aggregate counters from the default registry.
pub fn get_global_stats() -> Option<GlobalStats> {
    default_registry().global_stats()
}

/// Zeroes one profile (or all profiles) in the default registry.
pub fn clear_stats(profile: Option<&str>) {
    default_registry().clear(profile);
}

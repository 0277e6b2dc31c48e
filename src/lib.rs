//! Memo Cache - function-call memoization with an LRU core
//!
//! Wraps functions so that repeated calls with equivalent arguments are
//! served from a bounded, recency-ordered cache. Key equality is pluggable
//! (whole-key or per-argument comparators, serialization, transforms);
//! entries can expire on per-entry timers; lifecycle events (`add`, `hit`,
//! `update`, `delete`) drive expiration, statistics and external listeners;
//! future-returning functions share one in-flight computation per key.
//!
//! ```
//! use memo_cache::{memoize, Options};
//!
//! let expensive = memoize(
//!     |args: &[u64]| args.iter().product::<u64>(),
//!     Options::new().max_size(16),
//! )
//! .unwrap();
//!
//! assert_eq!(expensive.call(vec![6, 7]), 42); // computed
//! assert_eq!(expensive.call(vec![6, 7]), 42); // cached
//! ```

pub mod cache;
pub mod error;
pub mod expiration;
pub mod memoize;
pub mod stats;

pub use cache::{
    same_value_zero, CacheEvent, CacheKey, CacheStore, EntryToken, EventKind, KeyEquality,
    Listener, REASON_EVICTED, REASON_EXPLICIT_DELETE,
};
pub use error::{MemoError, Result};
pub use expiration::{
    ExpirationManager, Expires, REASON_EXPIRATION_RESET, REASON_EXPIRED,
};
pub use memoize::{
    memoize, memoize_async, CacheHandle, Memoized, MemoizedAsync, Options, SharedFuture,
    REASON_FORCED, REASON_REJECTED,
};
pub use stats::{
    clear_stats, get_global_stats, get_stats, is_collecting_stats, start_collecting_stats,
    stop_collecting_stats, GlobalStats, ProfileStats, StatsManager, StatsRegistry,
};

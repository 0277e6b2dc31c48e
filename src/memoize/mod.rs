//! Memoize Module
//!
//! The function composition layer binding user functions to cache stores.

mod future;
mod options;
mod wrapper;

// Re-export public types
pub use future::{
    memoize_async, AsyncMemoFn, MemoizedAsync, SharedFuture, REASON_REJECTED,
};
pub use options::{Options, PredicateFn};
pub use wrapper::{memoize, CacheHandle, MemoFn, Memoized, REASON_FORCED};

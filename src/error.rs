//! Error types for the memoization cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Memo Error Enum ==
/// Unified error type for memoization configuration.
///
/// All variants are configuration errors surfaced when building a wrapper;
/// cache operations themselves never fail under normal use.
#[derive(Error, Debug)]
pub enum MemoError {
    /// Both a whole-key comparator and a per-item comparator were supplied
    #[error(
        "conflicting key equality options: `is_key_equal` and `is_key_item_equal` \
         are mutually exclusive"
    )]
    ConflictingEquality,

    /// An expiration duration was not a finite, non-negative number
    #[error("invalid expiration duration: {0} (must be finite milliseconds >= 0)")]
    InvalidExpiration(f64),

    /// The cache size bound was zero
    #[error("max size must be at least 1")]
    InvalidMaxSize,
}

// == Result Type Alias ==
/// Convenience Result type for the memoization cache.
pub type Result<T> = std::result::Result<T, MemoError>;

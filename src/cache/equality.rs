//! Key Equality Module
//!
//! Pluggable strategies deciding whether two keys identify the same entry.

use std::sync::Arc;

use crate::cache::key::CacheKey;

/// Whole-key comparator function.
pub type WholeKeyFn<A> = Arc<dyn Fn(&CacheKey<A>, &CacheKey<A>) -> bool + Send + Sync>;

/// Per-argument comparator function.
pub type KeyItemFn<A> = Arc<dyn Fn(&A, &A) -> bool + Send + Sync>;

// == Key Equality ==
/// Equality strategy used by the store when scanning for a matching entry.
///
/// Either a single comparator over whole keys, or a per-item comparator
/// applied positionally (equal length required). The two schemes are
/// mutually exclusive; `Options::build` rejects configurations naming both.
pub struct KeyEquality<A> {
    compare: WholeKeyFn<A>,
}

impl<A> Clone for KeyEquality<A> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
        }
    }
}

impl<A> KeyEquality<A> {
    // == Whole-Key Strategy ==
    /// Replaces the per-item scheme entirely with one whole-key comparator.
    pub fn whole_key(compare: WholeKeyFn<A>) -> Self {
        Self { compare }
    }

    // == Per-Item Strategy ==
    /// Compares keys positionally: same length, every pair satisfies `item`.
    ///
    /// Serialized keys always compare by string equality, and a serialized
    /// key never equals a raw-argument key.
    pub fn per_item(item: KeyItemFn<A>) -> Self
    where
        A: 'static,
    {
        Self {
            compare: Arc::new(move |a, b| match (a, b) {
                (CacheKey::Args(xs), CacheKey::Args(ys)) => {
                    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| item(x, y))
                }
                (CacheKey::Serialized(x), CacheKey::Serialized(y)) => x == y,
                _ => false,
            }),
        }
    }

    // == Matches ==
    /// Applies the strategy to two keys.
    pub fn matches(&self, a: &CacheKey<A>, b: &CacheKey<A>) -> bool {
        (self.compare)(a, b)
    }
}

impl<A: PartialEq + 'static> Default for KeyEquality<A> {
    /// Default strategy: positional comparison via `PartialEq`.
    fn default() -> Self {
        Self::per_item(Arc::new(|a: &A, b: &A| a == b))
    }
}

// == Same Value Zero ==
/// SameValueZero comparison for float arguments: like `==` except that
/// `NaN` equals `NaN`.
///
/// Rust's `PartialEq` on floats follows IEEE semantics, so a memoized
/// function called with a `NaN` argument would otherwise never hit its own
/// cache entry.
pub fn same_value_zero(a: &f64, b: &f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

//! Memoization Options Module
//!
//! Builder for the configuration snapshot captured at wrap time. The
//! snapshot is immutable once a wrapper is built: reusing or mutating a
//! builder afterwards never affects an already-constructed wrapper.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::{
    json_serializer, KeyBuilder, KeyEquality, KeyItemFn, SerializeFn, TransformFn, WholeKeyFn,
};
use crate::error::{MemoError, Result};
use crate::expiration::Expires;
use crate::stats::{default_registry, StatsRegistry};

/// Forced-update predicate over the raw call arguments.
pub type PredicateFn<A> = Arc<dyn Fn(&[A]) -> bool + Send + Sync>;

// == Options ==
/// Memoization configuration. Defaults: `max_size` 1, per-item `PartialEq`
/// key equality, no transform stages, no expiration, no stats.
pub struct Options<A, V> {
    pub(crate) max_size: Option<usize>,
    pub(crate) is_key_equal: Option<WholeKeyFn<A>>,
    pub(crate) is_key_item_equal: Option<KeyItemFn<A>>,
    pub(crate) serialize: Option<SerializeFn<A>>,
    pub(crate) transform_key: Option<TransformFn<A>>,
    pub(crate) max_args: Option<usize>,
    pub(crate) expires: Option<Expires<A, V>>,
    pub(crate) stats_name: Option<String>,
    pub(crate) force_update: Option<PredicateFn<A>>,
    pub(crate) stats_registry: Option<Arc<StatsRegistry>>,
}

impl<A, V> Default for Options<A, V> {
    fn default() -> Self {
        Self {
            max_size: None,
            is_key_equal: None,
            is_key_item_equal: None,
            serialize: None,
            transform_key: None,
            max_args: None,
            expires: None,
            stats_name: None,
            force_update: None,
            stats_registry: None,
        }
    }
}

impl<A, V> Clone for Options<A, V> {
    fn clone(&self) -> Self {
        Self {
            max_size: self.max_size,
            is_key_equal: self.is_key_equal.clone(),
            is_key_item_equal: self.is_key_item_equal.clone(),
            serialize: self.serialize.clone(),
            transform_key: self.transform_key.clone(),
            max_args: self.max_args,
            expires: self.expires.clone(),
            stats_name: self.stats_name.clone(),
            force_update: self.force_update.clone(),
            stats_registry: self.stats_registry.clone(),
        }
    }
}

impl<A, V> Options<A, V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Cache Shape ==
    /// Maximum number of cached entries (default 1).
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    // == Key Equality ==
    /// Replaces the per-item scheme with a single whole-key comparator.
    /// Mutually exclusive with [`is_key_item_equal`](Self::is_key_item_equal).
    pub fn is_key_equal(mut self, compare: WholeKeyFn<A>) -> Self {
        self.is_key_equal = Some(compare);
        self
    }

    /// Per-argument comparator (default: `PartialEq`). Mutually exclusive
    /// with [`is_key_equal`](Self::is_key_equal).
    pub fn is_key_item_equal(mut self, compare: KeyItemFn<A>) -> Self {
        self.is_key_item_equal = Some(compare);
        self
    }

    // == Key Transform Pipeline ==
    /// Serializes arguments into a string key with the default serde_json
    /// serializer.
    pub fn serialize(mut self) -> Self
    where
        A: Serialize,
    {
        self.serialize = Some(json_serializer::<A>());
        self
    }

    /// Serializes arguments into a string key with a custom function.
    pub fn serialize_with(mut self, serialize: SerializeFn<A>) -> Self {
        self.serialize = Some(serialize);
        self
    }

    /// Custom final transform applied to the built key.
    pub fn transform_key(mut self, transform: TransformFn<A>) -> Self {
        self.transform_key = Some(transform);
        self
    }

    /// Only the first `max_args` positional arguments participate in the key.
    pub fn max_args(mut self, max_args: usize) -> Self {
        self.max_args = Some(max_args);
        self
    }

    // == Lifecycle ==
    /// Time-based expiration for cached entries.
    ///
    /// Timers are tokio tasks: a wrapper built with expiration must be
    /// called from within a tokio runtime.
    pub fn expires(mut self, expires: Expires<A, V>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Report call/hit counters into the named stats profile.
    pub fn stats_name(mut self, name: impl Into<String>) -> Self {
        self.stats_name = Some(name.into());
        self
    }

    /// Registry for stats reporting (default: the process-wide registry).
    pub fn stats_registry(mut self, registry: Arc<StatsRegistry>) -> Self {
        self.stats_registry = Some(registry);
        self
    }

    /// For calls the predicate accepts, bypass the cache read and overwrite
    /// the existing entry with a freshly computed value.
    pub fn force_update(mut self, predicate: PredicateFn<A>) -> Self {
        self.force_update = Some(predicate);
        self
    }

    // == Merge ==
    /// Layering for re-memoization: fields set on `self` win, everything
    /// else comes from `base`.
    pub(crate) fn merged_over(self, base: &Options<A, V>) -> Options<A, V> {
        Options {
            max_size: self.max_size.or(base.max_size),
            is_key_equal: self.is_key_equal.or_else(|| base.is_key_equal.clone()),
            is_key_item_equal: self
                .is_key_item_equal
                .or_else(|| base.is_key_item_equal.clone()),
            serialize: self.serialize.or_else(|| base.serialize.clone()),
            transform_key: self.transform_key.or_else(|| base.transform_key.clone()),
            max_args: self.max_args.or(base.max_args),
            expires: self.expires.or_else(|| base.expires.clone()),
            stats_name: self.stats_name.or_else(|| base.stats_name.clone()),
            force_update: self.force_update.or_else(|| base.force_update.clone()),
            stats_registry: self.stats_registry.or_else(|| base.stats_registry.clone()),
        }
    }

    // == Resolve ==
    /// Validates the snapshot and derives the internal strategies.
    pub(crate) fn resolve(&self) -> Result<Resolved<A, V>>
    where
        A: Clone + PartialEq + 'static,
    {
        if self.is_key_equal.is_some() && self.is_key_item_equal.is_some() {
            return Err(MemoError::ConflictingEquality);
        }
        let max_size = match self.max_size {
            Some(0) => return Err(MemoError::InvalidMaxSize),
            Some(n) => n,
            None => 1,
        };
        if let Some(expires) = &self.expires {
            expires.validate()?;
        }

        let equality = match (&self.is_key_equal, &self.is_key_item_equal) {
            (Some(whole), _) => KeyEquality::whole_key(Arc::clone(whole)),
            (_, Some(item)) => KeyEquality::per_item(Arc::clone(item)),
            _ => KeyEquality::default(),
        };

        Ok(Resolved {
            max_size,
            equality,
            key_builder: KeyBuilder::new(
                self.serialize.clone(),
                self.max_args,
                self.transform_key.clone(),
            ),
            expires: self.expires.clone(),
            stats_name: self.stats_name.clone(),
            force_update: self.force_update.clone(),
            registry: self
                .stats_registry
                .clone()
                .unwrap_or_else(|| Arc::clone(default_registry())),
        })
    }
}

// == Resolved Options ==
/// The validated, derived form consumed by wrapper constructors.
pub(crate) struct Resolved<A, V> {
    pub max_size: usize,
    pub equality: KeyEquality<A>,
    pub key_builder: KeyBuilder<A>,
    pub expires: Option<Expires<A, V>>,
    pub stats_name: Option<String>,
    pub force_update: Option<PredicateFn<A>>,
    pub registry: Arc<StatsRegistry>,
}

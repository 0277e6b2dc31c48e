//! Cache Key Module
//!
//! Keys and the transform pipeline mapping raw call arguments into the
//! canonical key stored and compared by the cache.

use std::sync::Arc;

use serde::Serialize;

/// Serializer stage: maps the raw argument slice to a string key.
pub type SerializeFn<A> = Arc<dyn Fn(&[A]) -> String + Send + Sync>;

/// Custom transform stage: maps an already-built key to the final key.
pub type TransformFn<A> = Arc<dyn Fn(CacheKey<A>) -> CacheKey<A> + Send + Sync>;

// == Cache Key ==
/// A cache key: the ordered argument sequence, or its serialized form when
/// the serialization stage is configured.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey<A> {
    /// Raw positional arguments (owned, detached from the caller)
    Args(Vec<A>),
    /// Serialized representative produced by the serialization stage
    Serialized(String),
}

impl<A> CacheKey<A> {
    /// Number of positional items (1 for a serialized key).
    pub fn len(&self) -> usize {
        match self {
            CacheKey::Args(args) => args.len(),
            CacheKey::Serialized(_) => 1,
        }
    }

    /// True for a zero-argument raw key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Key Builder ==
/// The transform pipeline, composed left-to-right in fixed stage order
/// regardless of the order options were configured:
///
/// 1. serialization (default serde_json-based, or user-supplied)
/// 2. max-argument truncation (keep the first N positional arguments)
/// 3. user-supplied custom transform
///
/// With no stage configured the raw argument vector is the key.
pub struct KeyBuilder<A> {
    serializer: Option<SerializeFn<A>>,
    max_args: Option<usize>,
    transform: Option<TransformFn<A>>,
}

impl<A> Clone for KeyBuilder<A> {
    fn clone(&self) -> Self {
        Self {
            serializer: self.serializer.clone(),
            max_args: self.max_args,
            transform: self.transform.clone(),
        }
    }
}

impl<A> Default for KeyBuilder<A> {
    fn default() -> Self {
        Self {
            serializer: None,
            max_args: None,
            transform: None,
        }
    }
}

impl<A> KeyBuilder<A> {
    // == Constructor ==
    pub fn new(
        serializer: Option<SerializeFn<A>>,
        max_args: Option<usize>,
        transform: Option<TransformFn<A>>,
    ) -> Self {
        Self {
            serializer,
            max_args,
            transform,
        }
    }

    // == Build ==
    /// Runs the pipeline over one call's arguments.
    pub fn build(&self, args: Vec<A>) -> CacheKey<A> {
        let mut key = match &self.serializer {
            Some(serialize) => CacheKey::Serialized(serialize(&args)),
            None => CacheKey::Args(args),
        };

        if let Some(max) = self.max_args {
            if let CacheKey::Args(items) = &mut key {
                items.truncate(max);
            }
        }

        if let Some(transform) = &self.transform {
            key = transform(key);
        }

        key
    }
}

// == Default Serializer ==
/// Builds the default serializer: each argument rendered with serde_json
/// (a placeholder for values that fail to serialize), joined with `|`.
///
/// Owned Rust values cannot form reference cycles, so no cycle handling is
/// needed here.
pub fn json_serializer<A: Serialize>() -> SerializeFn<A> {
    Arc::new(|args: &[A]| {
        args.iter()
            .map(|arg| {
                serde_json::to_string(arg).unwrap_or_else(|_| "<unserializable>".to_string())
            })
            .collect::<Vec<_>>()
            .join("|")
    })
}

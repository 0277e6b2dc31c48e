//! Cache Module
//!
//! The memoization engine: recency-ordered bounded storage, pluggable key
//! equality, the key transform pipeline and lifecycle events.

mod equality;
mod events;
mod key;
mod node;
mod store;


// Re-export public types
pub use equality::{same_value_zero, KeyEquality, KeyItemFn, WholeKeyFn};
pub use events::{CacheEvent, EventEmitter, EventKind, Listener};
pub use key::{json_serializer, CacheKey, KeyBuilder, SerializeFn, TransformFn};
pub use node::{CacheNode, EntryToken};
pub use store::{CacheStore, REASON_EVICTED, REASON_EXPLICIT_DELETE};

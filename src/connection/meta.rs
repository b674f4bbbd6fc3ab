//! Typed per-connection metadata.
//!
//! Middleware attaches state to a connection through a small map keyed by
//! value type rather than by string, so each interceptor owns a private
//! newtype key and cannot collide with another's entries.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A map from value type to one value of that type.
#[derive(Debug, Default)]
pub struct MetaMap {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MetaMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`, replacing any previous value of the same type.
    pub fn set<V: Any + Send + Sync>(&mut self, value: V) {
        self.entries.insert(TypeId::of::<V>(), Box::new(value));
    }

    /// Borrow the stored value of type `V`, if any.
    #[must_use]
    pub fn get<V: Any + Send + Sync>(&self) -> Option<&V> {
        self.entries
            .get(&TypeId::of::<V>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Mutably borrow the stored value of type `V`, if any.
    pub fn get_mut<V: Any + Send + Sync>(&mut self) -> Option<&mut V> {
        self.entries
            .get_mut(&TypeId::of::<V>())
            .and_then(|boxed| boxed.downcast_mut())
    }

    /// Remove and return the stored value of type `V`, if any.
    pub fn take<V: Any + Send + Sync>(&mut self) -> Option<V> {
        self.entries
            .remove(&TypeId::of::<V>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Typed request attributes.
//!
//! The dispatcher and the route tables publish request-scoped values
//! (matched pattern, template variables, locale, flash maps) for downstream
//! handlers and interceptors. Values are keyed by their type, so each
//! published value is a small newtype:
//!
//! ```rust
//! use switchyard_core::{Attributes, BestMatchingPattern};
//!
//! let mut attrs = Attributes::new();
//! attrs.insert(BestMatchingPattern("/users/{id}".to_string()));
//!
//! let pattern = attrs.get::<BestMatchingPattern>().unwrap();
//! assert_eq!(pattern.0, "/users/{id}");
//! ```
//!
//! Values are stored behind `Arc`, so [`Attributes::snapshot`] is cheap and
//! is what include dispatches use to restore state afterwards.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-keyed attribute map attached to every [`HttpRequest`](crate::HttpRequest).
#[derive(Clone, Default)]
pub struct Attributes {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    #[inline]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Insert a value that is already shared.
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), value);
    }

    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a shared handle to a value.
    pub fn get_arc<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    #[inline]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Remove a value. Returns `true` when something was removed.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.map.remove(&TypeId::of::<T>()).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Copy every value of `other` in, replacing values of the same type.
    pub fn extend_from(&mut self, other: &Attributes) {
        for (type_id, value) in &other.map {
            self.map.insert(*type_id, Arc::clone(value));
        }
    }

    /// Capture the current attribute set.
    pub fn snapshot(&self) -> AttributeSnapshot {
        AttributeSnapshot {
            map: self.map.clone(),
        }
    }

    /// Put back exactly the attributes captured by `snapshot`.
    ///
    /// Values added since the snapshot are dropped and values removed since
    /// the snapshot come back.
    pub fn restore(&mut self, snapshot: AttributeSnapshot) {
        self.map = snapshot.map;
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attributes")
            .field("count", &self.map.len())
            .finish()
    }
}

/// Point-in-time copy of a request's attributes.
#[derive(Clone)]
pub struct AttributeSnapshot {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl AttributeSnapshot {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

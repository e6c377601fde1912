//! KeyValueStore trait abstraction for local persistence.
//!
//! Implementations:
//! - `InMemoryStore` - For testing
//! - `FileStore` (in quote-daemon) - One file per key under a data directory
//!
//! The store is pure get/set. Callers decide what goes in each slot.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Slot holding the JSON-serialized quote list.
pub const QUOTES_KEY: &str = "quotes";

/// Slot holding the last-selected category filter.
pub const FILTER_KEY: &str = "selected_category";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// String-keyed persistence for small string values.
///
/// Methods are synchronous and take `&self`; implementations use interior
/// mutability so a store can be shared behind an `Arc`.
pub trait KeyValueStore: Send + Sync {
    /// Read a slot. Returns `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a slot.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Clear a slot. Clearing a missing slot is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for testing
#[derive(Default)]
pub struct InMemoryStore {
    slots: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with one slot pre-populated.
    pub fn with_slot(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

// Lets the collection and the session share one store.
impl<T: KeyValueStore> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

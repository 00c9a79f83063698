//! Per-client key/value scratch storage.
//!
//! Every client owns one [`Store`] created by the server's [`StoreFactory`]
//! when the connection is accepted, and destroyed when it is torn down.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Key/value storage attached to a client.
pub trait Store: Send + Sync {
    /// Set a value, replacing any previous one.
    fn set(&self, key: &str, value: Value);

    /// Get a copy of a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Delete a value.
    fn delete(&self, key: &str);

    /// Delete a value and return it.
    fn take(&self, key: &str) -> Option<Value>;

    /// Check whether a key is present.
    fn has(&self, key: &str) -> bool;

    /// Release everything held by the store.
    fn destroy(&self);
}

/// Produces one store per accepted connection.
pub type StoreFactory = Arc<dyn Fn() -> Box<dyn Store> + Send + Sync>;

/// Factory for [`LocalStore`].
#[must_use]
pub fn local_store_factory() -> StoreFactory {
    Arc::new(|| Box::new(LocalStore::new()))
}

/// In-memory store backed by a hash map.
#[derive(Debug, Default)]
pub struct LocalStore {
    data: RwLock<HashMap<String, Value>>,
}

impl LocalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Store for LocalStore {
    fn set(&self, key: &str, value: Value) {
        self.data.write().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    fn take(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    fn has(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    fn destroy(&self) {
        self.data.write().clear();
    }
}

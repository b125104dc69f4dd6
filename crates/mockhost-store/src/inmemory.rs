//! In-memory store implementation

use crate::{Error, Result, Store, StoreValue};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// In-memory store
///
/// Fast, zero dependencies, but single-instance only.
/// Perfect for development, testing, and single-node deployments.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    name: String,
    items: Arc<DashMap<String, StoreValue>>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Arc::new(DashMap::new()),
        }
    }

    /// Remove every item
    pub fn clear(&self) {
        debug!(store = %self.name, "InMemory CLEAR - removing all items");
        self.items.clear();
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Store for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_description(&self) -> &str {
        "in-memory"
    }

    fn is_ephemeral(&self) -> bool {
        true
    }

    fn save(&self, key: &str, value: StoreValue) -> Result<()> {
        trace!(store = %self.name, key, kind = value.type_name(), "InMemory SAVE");

        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<StoreValue>> {
        trace!(store = %self.name, key, "InMemory LOAD");
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        trace!(store = %self.name, key, "InMemory DELETE");
        self.items.remove(key);
        Ok(())
    }

    fn load_all(&self) -> Result<BTreeMap<String, StoreValue>> {
        trace!(store = %self.name, "InMemory LOAD ALL");
        Ok(self
            .items
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    fn load_by_key_prefix(&self, prefix: &str) -> Result<BTreeMap<String, StoreValue>> {
        trace!(store = %self.name, prefix, "InMemory LOAD BY PREFIX");
        Ok(self
            .items
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    fn has_item_with_key(&self, key: &str) -> Result<bool> {
        Ok(self.items.contains_key(key))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.items.len())
    }
}

//! Store trait definition

use crate::{Result, StoreValue};
use std::collections::BTreeMap;
use std::fmt;

/// Named key/value store
///
/// Operations are synchronous: scripts call into stores from inside a
/// blocking evaluation.
pub trait Store: Send + Sync + fmt::Debug {
    /// Store name
    fn name(&self) -> &str;

    /// Human-readable description of the implementation
    fn type_description(&self) -> &str;

    /// Whether contents are lost on restart
    fn is_ephemeral(&self) -> bool;

    /// Save a value, replacing any existing one
    fn save(&self, key: &str, value: StoreValue) -> Result<()>;

    /// Load a value
    ///
    /// Returns `None` if the key doesn't exist.
    fn load(&self, key: &str) -> Result<Option<StoreValue>>;

    /// Delete a key
    ///
    /// Returns Ok(()) whether the key existed or not.
    fn delete(&self, key: &str) -> Result<()>;

    /// Load every item
    fn load_all(&self) -> Result<BTreeMap<String, StoreValue>>;

    /// Load every item whose key starts with `prefix`
    fn load_by_key_prefix(&self, prefix: &str) -> Result<BTreeMap<String, StoreValue>> {
        // Default implementation: filter a full load
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }

    /// Check if a key exists
    fn has_item_with_key(&self, key: &str) -> Result<bool> {
        Ok(self.load(key)?.is_some())
    }

    /// Number of items
    fn count(&self) -> Result<usize>;
}

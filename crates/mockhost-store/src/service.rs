//! Store service and interceptor registry

use crate::{Error, InMemoryStore, Result, Store};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Factory that wraps a store handle with an adapter
///
/// Registered per script engine; applied whenever a script running on that
/// engine opens a store.
pub type StoreInterceptor = Arc<dyn Fn(Arc<dyn Store>) -> Arc<dyn Store> + Send + Sync>;

/// Owns the named stores and the interceptors registered by script engines
#[derive(Clone, Default)]
pub struct StoreService {
    stores: Arc<DashMap<String, Arc<dyn Store>>>,
    interceptors: Arc<DashMap<String, StoreInterceptor>>,
}

impl fmt::Debug for StoreService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreService")
            .field("stores", &self.store_names())
            .field(
                "interceptors",
                &self
                    .interceptors
                    .iter()
                    .map(|e| e.key().clone())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl StoreService {
    /// Create an empty store service
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store, creating an in-memory one if it doesn't exist
    pub fn open_store(&self, name: &str) -> Arc<dyn Store> {
        self.stores
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(store = %name, "Creating in-memory store");
                Arc::new(InMemoryStore::new(name))
            })
            .value()
            .clone()
    }

    /// Open a store on behalf of a script engine
    ///
    /// If the engine registered an interceptor, the returned handle is the
    /// interceptor's adapter around the store.
    pub fn open_store_for_engine(&self, name: &str, engine: &str) -> Arc<dyn Store> {
        let store = self.open_store(name);
        match self.interceptors.get(engine) {
            Some(interceptor) => {
                tracing::trace!(store = %name, engine, "Applying store interceptor");
                (interceptor.value())(store)
            }
            None => store,
        }
    }

    /// Get an existing store
    pub fn get_store(&self, name: &str) -> Result<Arc<dyn Store>> {
        self.stores
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }

    /// Add a store with a custom implementation
    pub fn add_store(&self, store: Arc<dyn Store>) {
        self.stores.insert(store.name().to_string(), store);
    }

    /// Remove a store; returns whether it existed
    pub fn delete_store(&self, name: &str) -> bool {
        self.stores.remove(name).is_some()
    }

    /// Names of all open stores
    pub fn store_names(&self) -> Vec<String> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    /// Register the interceptor for a script engine
    ///
    /// Expected once, at startup, before any script of that engine runs.
    pub fn register_interceptor(&self, engine: &str, interceptor: StoreInterceptor) {
        if self
            .interceptors
            .insert(engine.to_string(), interceptor)
            .is_some()
        {
            tracing::warn!(engine, "Replacing existing store interceptor");
        } else {
            tracing::info!(engine, "Store interceptor registered");
        }
    }

    /// Whether an interceptor is registered for the engine
    pub fn has_interceptor(&self, engine: &str) -> bool {
        self.interceptors.contains_key(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreValue;
    use std::collections::BTreeMap;

    /// Adapter that upper-cases string values on save
    #[derive(Debug)]
    struct Shouting(Arc<dyn Store>);

    impl Store for Shouting {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn type_description(&self) -> &str {
            "shouting"
        }
        fn is_ephemeral(&self) -> bool {
            self.0.is_ephemeral()
        }
        fn save(&self, key: &str, value: StoreValue) -> Result<()> {
            let value = match value {
                StoreValue::String(s) => StoreValue::String(s.to_uppercase()),
                other => other,
            };
            self.0.save(key, value)
        }
        fn load(&self, key: &str) -> Result<Option<StoreValue>> {
            self.0.load(key)
        }
        fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key)
        }
        fn load_all(&self) -> Result<BTreeMap<String, StoreValue>> {
            self.0.load_all()
        }
        fn count(&self) -> Result<usize> {
            self.0.count()
        }
    }

    #[test]
    fn test_open_store_is_idempotent() {
        let service = StoreService::new();
        let a = service.open_store("users");
        a.save("k", StoreValue::Int(1)).unwrap();

        let b = service.open_store("users");
        assert_eq!(b.load("k").unwrap(), Some(StoreValue::Int(1)));
        assert_eq!(service.store_names(), vec!["users".to_string()]);
    }

    #[test]
    fn test_get_missing_store() {
        let service = StoreService::new();
        assert!(matches!(
            service.get_store("nope"),
            Err(Error::StoreNotFound(_))
        ));
    }

    #[test]
    fn test_interceptor_applies_only_to_its_engine() {
        let service = StoreService::new();
        service.register_interceptor(
            "loud",
            Arc::new(|s: Arc<dyn Store>| -> Arc<dyn Store> { Arc::new(Shouting(s)) }),
        );
        assert!(service.has_interceptor("loud"));

        service
            .open_store_for_engine("s", "loud")
            .save("a", "hi".into())
            .unwrap();
        service
            .open_store_for_engine("s", "quiet")
            .save("b", "hi".into())
            .unwrap();

        let store = service.get_store("s").unwrap();
        assert_eq!(store.load("a").unwrap(), Some(StoreValue::from("HI")));
        assert_eq!(store.load("b").unwrap(), Some(StoreValue::from("hi")));
    }

    #[test]
    fn test_delete_store() {
        let service = StoreService::new();
        service.open_store("tmp");
        assert!(service.delete_store("tmp"));
        assert!(!service.delete_store("tmp"));
    }
}

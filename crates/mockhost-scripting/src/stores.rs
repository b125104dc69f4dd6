//! Store access from scripts

use crate::rhai_engine::ENGINE_NAME;
use mockhost_store::{ForeignValue, Store, StoreService, StoreValue};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, INT};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Conventional binding name for [`StoresBinding`]
pub const STORES_VAR_NAME: &str = "stores";

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// `stores` object handed to scripts
///
/// Stores opened through it pass through whatever interceptor the script
/// engine registered.
#[derive(Debug, Clone)]
pub struct StoresBinding {
    service: StoreService,
}

impl StoresBinding {
    /// Create a binding over a store service
    pub fn new(service: StoreService) -> Self {
        Self { service }
    }

    /// Open a named store
    pub fn open(&self, name: &str) -> ScriptStore {
        ScriptStore {
            store: self.service.open_store_for_engine(name, ENGINE_NAME),
        }
    }
}

/// Store handle as seen by a script
#[derive(Debug, Clone)]
pub struct ScriptStore {
    store: Arc<dyn Store>,
}

impl ScriptStore {
    /// Store name
    pub fn name(&self) -> String {
        self.store.name().to_string()
    }

    /// Save a script value
    pub fn save(&self, key: &str, value: Dynamic) -> ScriptResult<()> {
        self.store
            .save(key, to_store_value(value))
            .map_err(store_error)
    }

    /// Load a value; `()` if absent
    pub fn load(&self, key: &str) -> ScriptResult<Dynamic> {
        let value = self.store.load(key).map_err(store_error)?;
        Ok(value.map(from_store_value).unwrap_or(Dynamic::UNIT))
    }

    /// Delete a value
    pub fn delete(&self, key: &str) -> ScriptResult<()> {
        self.store.delete(key).map_err(store_error)
    }

    /// Whether a key exists
    pub fn has_item_with_key(&self, key: &str) -> ScriptResult<bool> {
        self.store.has_item_with_key(key).map_err(store_error)
    }

    /// Number of items
    pub fn count(&self) -> ScriptResult<INT> {
        let count = self.store.count().map_err(store_error)?;
        Ok(INT::try_from(count).unwrap_or(INT::MAX))
    }

    /// Every item as an object map
    pub fn load_all(&self) -> ScriptResult<Map> {
        self.store.load_all().map(to_map).map_err(store_error)
    }

    /// Items whose key starts with `prefix`
    pub fn load_by_key_prefix(&self, prefix: &str) -> ScriptResult<Map> {
        self.store
            .load_by_key_prefix(prefix)
            .map(to_map)
            .map_err(store_error)
    }
}

fn store_error(err: mockhost_store::Error) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn to_map(items: BTreeMap<String, StoreValue>) -> Map {
    items
        .into_iter()
        .map(|(key, value)| (key.into(), from_store_value(value)))
        .collect()
}

/// Store value for a primitive script value
pub(crate) fn primitive(value: &Dynamic) -> Option<StoreValue> {
    if value.is_unit() {
        Some(StoreValue::Null)
    } else if let Ok(b) = value.as_bool() {
        Some(StoreValue::Bool(b))
    } else if let Ok(i) = value.as_int() {
        Some(StoreValue::Int(i))
    } else if let Ok(f) = value.as_float() {
        Some(StoreValue::Float(f))
    } else if let Ok(c) = value.as_char() {
        Some(StoreValue::String(c.to_string()))
    } else if value.is_string() {
        value.clone().into_string().ok().map(StoreValue::String)
    } else {
        value
            .read_lock::<ForeignValue>()
            .map(|foreign| StoreValue::Foreign(foreign.clone()))
    }
}

/// Store value for any script value
///
/// Primitives convert; anything else is stored as an opaque reference to the
/// script value itself.
pub(crate) fn to_store_value(value: Dynamic) -> StoreValue {
    let value = value.flatten();
    primitive(&value).unwrap_or_else(|| StoreValue::Foreign(ForeignValue::new(value)))
}

/// Script value for a stored value
///
/// Host objects and arrays come back as snapshots.
pub(crate) fn from_store_value(value: StoreValue) -> Dynamic {
    snapshot(value, &mut Vec::new())
}

/// Script value held by a foreign handle, or the handle itself
pub(crate) fn foreign_to_dynamic(foreign: ForeignValue) -> Dynamic {
    match foreign.downcast_ref::<Dynamic>() {
        Some(value) => value.clone(),
        None => Dynamic::from(foreign),
    }
}

fn snapshot(value: StoreValue, path: &mut Vec<usize>) -> Dynamic {
    match value {
        StoreValue::Null => Dynamic::UNIT,
        StoreValue::Bool(b) => Dynamic::from_bool(b),
        StoreValue::Int(i) => Dynamic::from_int(i),
        StoreValue::Float(f) => Dynamic::from_float(f),
        StoreValue::String(s) => Dynamic::from(s),
        StoreValue::Object(obj) => {
            // Cycles end in ()
            if path.contains(&obj.id()) {
                return Dynamic::UNIT;
            }
            path.push(obj.id());
            let map: Map = obj
                .entries()
                .into_iter()
                .map(|(key, value)| (key.into(), snapshot(value, path)))
                .collect();
            path.pop();
            Dynamic::from_map(map)
        }
        StoreValue::Array(arr) => {
            if path.contains(&arr.id()) {
                return Dynamic::UNIT;
            }
            path.push(arr.id());
            let items: Array = arr
                .items()
                .into_iter()
                .map(|value| snapshot(value, path))
                .collect();
            path.pop();
            Dynamic::from_array(items)
        }
        StoreValue::Foreign(foreign) => foreign_to_dynamic(foreign),
    }
}

pub(crate) fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<StoresBinding>("Stores")
        .register_fn("open", |stores: &mut StoresBinding, name: &str| {
            stores.open(name)
        });

    engine
        .register_type_with_name::<ScriptStore>("Store")
        .register_get("name", |store: &mut ScriptStore| store.name())
        .register_fn(
            "save",
            |store: &mut ScriptStore, key: &str, value: Dynamic| store.save(key, value),
        )
        .register_fn("load", |store: &mut ScriptStore, key: &str| store.load(key))
        .register_fn("delete", |store: &mut ScriptStore, key: &str| {
            store.delete(key)
        })
        .register_fn("hasItemWithKey", |store: &mut ScriptStore, key: &str| {
            store.has_item_with_key(key)
        })
        .register_fn("count", |store: &mut ScriptStore| store.count())
        .register_fn("loadAll", |store: &mut ScriptStore| store.load_all())
        .register_fn("loadByKeyPrefix", |store: &mut ScriptStore, prefix: &str| {
            store.load_by_key_prefix(prefix)
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockhost_store::{ArrayRef, ObjectRef};

    fn run(service: &StoreService, script: &str) -> Dynamic {
        let mut engine = Engine::new();
        register(&mut engine);

        let mut scope = rhai::Scope::new();
        scope.push(STORES_VAR_NAME, StoresBinding::new(service.clone()));
        engine.eval_with_scope(&mut scope, script).unwrap()
    }

    #[test]
    fn test_primitives_round_trip_through_host() {
        let service = StoreService::new();
        run(
            &service,
            r#"
            let s = stores.open("prims");
            s.save("i", 7);
            s.save("f", 1.5);
            s.save("b", true);
            s.save("t", "text");
            s.save("n", ());
            "#,
        );

        let store = service.get_store("prims").unwrap();
        assert_eq!(store.load("i").unwrap(), Some(StoreValue::Int(7)));
        assert_eq!(store.load("f").unwrap(), Some(StoreValue::Float(1.5)));
        assert_eq!(store.load("b").unwrap(), Some(StoreValue::Bool(true)));
        assert_eq!(store.load("t").unwrap(), Some(StoreValue::from("text")));
        assert_eq!(store.load("n").unwrap(), Some(StoreValue::Null));
    }

    #[test]
    fn test_raw_objects_are_opaque_references() {
        let service = StoreService::new();
        let loaded = run(
            &service,
            r#"
            let s = stores.open("raw");
            s.save("obj", #{ a: 1 });
            s.load("obj").a
            "#,
        );
        assert_eq!(loaded.as_int().unwrap(), 1);

        let stored = service.get_store("raw").unwrap().load("obj").unwrap().unwrap();
        assert!(stored.as_foreign().is_some());
    }

    #[test]
    fn test_host_objects_load_as_snapshots() {
        let service = StoreService::new();
        let obj = ObjectRef::from_entries([("name", StoreValue::from("ada"))]);
        service
            .open_store("host")
            .save("user", StoreValue::Object(obj.clone()))
            .unwrap();

        let name = run(
            &service,
            r#"
            let user = stores.open("host").load("user");
            user.name = "changed";
            user.name
            "#,
        );

        assert_eq!(name.into_string().unwrap(), "changed");
        assert_eq!(obj.get("name"), Some(StoreValue::from("ada")));
    }

    #[test]
    fn test_queries() {
        let service = StoreService::new();
        let count = run(
            &service,
            r#"
            let s = stores.open("q");
            s.save("user:1", "a");
            s.save("user:2", "b");
            s.save("other", "c");
            s.delete("other");
            if !s.hasItemWithKey("user:1") { throw "missing"; }
            if s.loadAll().len() != 2 { throw "loadAll"; }
            s.loadByKeyPrefix("user:").len() + s.count()
            "#,
        );
        assert_eq!(count.as_int().unwrap(), 4);
    }

    #[test]
    fn test_missing_key_loads_unit() {
        let service = StoreService::new();
        assert!(run(&service, r#"stores.open("e").load("nope")"#).is_unit());
    }

    #[test]
    fn test_cyclic_snapshot_terminates() {
        let obj = ObjectRef::new();
        let arr = ArrayRef::new();
        arr.push(StoreValue::Object(obj.clone()));
        obj.insert("items", StoreValue::Array(arr));

        let value = from_store_value(StoreValue::Object(obj));
        let map = value.cast::<Map>();
        let items = map["items"].clone().cast::<Array>();
        assert!(items[0].is_unit());
    }
}

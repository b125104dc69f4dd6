//! Store interceptor that shares objects between scripts and the host
//!
//! Without it a script map saved to a store is an opaque copy, and a host
//! object loaded by a script is a snapshot. With it, script maps and arrays
//! are adopted into host objects on save, and host objects come back as live
//! proxies: mutations through a proxy are what the store holds.

use crate::stores::{foreign_to_dynamic, from_store_value, primitive};
use mockhost_store::{
    ArrayRef, ForeignValue, ObjectRef, Result, Store, StoreInterceptor, StoreValue,
};
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, INT};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Script view of a host object
#[derive(Debug, Clone)]
pub struct ObjectProxy(ObjectRef);

impl ObjectProxy {
    /// Proxy a host object
    pub fn new(target: ObjectRef) -> Self {
        Self(target)
    }

    /// Proxied host object
    pub fn target(&self) -> &ObjectRef {
        &self.0
    }

    fn get(&self, key: &str) -> Dynamic {
        self.0.get(key).map(to_script).unwrap_or(Dynamic::UNIT)
    }

    fn set(&self, key: &str, value: Dynamic) {
        self.0.insert(key, adopt(value));
    }

    fn keys(&self) -> Array {
        self.0.keys().into_iter().map(Dynamic::from).collect()
    }

    fn remove(&self, key: &str) -> Dynamic {
        self.0.remove(key).map(to_script).unwrap_or(Dynamic::UNIT)
    }
}

/// Script view of a host array
#[derive(Debug, Clone)]
pub struct ArrayProxy(ArrayRef);

impl ArrayProxy {
    /// Proxy a host array
    pub fn new(target: ArrayRef) -> Self {
        Self(target)
    }

    /// Proxied host array
    pub fn target(&self) -> &ArrayRef {
        &self.0
    }

    fn slot(&self, index: INT) -> ScriptResult<usize> {
        let len = self.0.len();
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or_else(|| EvalAltResult::ErrorArrayBounds(len, index, Position::NONE).into())
    }

    fn get(&self, index: INT) -> ScriptResult<Dynamic> {
        let slot = self.slot(index)?;
        Ok(self.0.get(slot).map(to_script).unwrap_or(Dynamic::UNIT))
    }

    fn set(&self, index: INT, value: Dynamic) -> ScriptResult<()> {
        let slot = self.slot(index)?;
        self.0.set(slot, adopt(value));
        Ok(())
    }
}

/// Store adapter installed by the scripting engine
#[derive(Debug)]
pub struct ObjectProxyingStore {
    delegate: Arc<dyn Store>,
}

impl ObjectProxyingStore {
    /// Wrap a store
    pub fn new(delegate: Arc<dyn Store>) -> Self {
        Self { delegate }
    }

    /// Interceptor factory for the store service registry
    pub fn interceptor() -> StoreInterceptor {
        Arc::new(|store: Arc<dyn Store>| -> Arc<dyn Store> {
            Arc::new(ObjectProxyingStore::new(store))
        })
    }
}

impl Store for ObjectProxyingStore {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn type_description(&self) -> &str {
        self.delegate.type_description()
    }

    fn is_ephemeral(&self) -> bool {
        self.delegate.is_ephemeral()
    }

    fn save(&self, key: &str, value: StoreValue) -> Result<()> {
        self.delegate.save(key, adopt_foreign(value))
    }

    fn load(&self, key: &str) -> Result<Option<StoreValue>> {
        Ok(self.delegate.load(key)?.map(proxied))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.delegate.delete(key)
    }

    fn load_all(&self) -> Result<BTreeMap<String, StoreValue>> {
        Ok(proxied_all(self.delegate.load_all()?))
    }

    fn load_by_key_prefix(&self, prefix: &str) -> Result<BTreeMap<String, StoreValue>> {
        Ok(proxied_all(self.delegate.load_by_key_prefix(prefix)?))
    }

    fn has_item_with_key(&self, key: &str) -> Result<bool> {
        self.delegate.has_item_with_key(key)
    }

    fn count(&self) -> Result<usize> {
        self.delegate.count()
    }
}

/// Adopt a script value carried in a foreign handle
///
/// A value that cannot be adopted is stored as it came in.
fn adopt_foreign(value: StoreValue) -> StoreValue {
    let StoreValue::Foreign(foreign) = value else {
        return value;
    };
    let Some(script_value) = foreign.downcast_ref::<Dynamic>() else {
        return StoreValue::Foreign(foreign);
    };

    match try_adopt(script_value.clone()) {
        Ok(adopted) => adopted,
        Err(original) => {
            debug!(
                kind = original.type_name(),
                "Proxy not established, keeping original value"
            );
            StoreValue::Foreign(foreign)
        }
    }
}

fn proxied(value: StoreValue) -> StoreValue {
    match value {
        StoreValue::Object(obj) => {
            StoreValue::Foreign(ForeignValue::new(Dynamic::from(ObjectProxy(obj))))
        }
        StoreValue::Array(arr) => {
            StoreValue::Foreign(ForeignValue::new(Dynamic::from(ArrayProxy(arr))))
        }
        other => other,
    }
}

fn proxied_all(items: BTreeMap<String, StoreValue>) -> BTreeMap<String, StoreValue> {
    items
        .into_iter()
        .map(|(key, value)| (key, proxied(value)))
        .collect()
}

/// Script value for a host value, proxying objects and arrays
fn to_script(value: StoreValue) -> Dynamic {
    match value {
        StoreValue::Object(obj) => Dynamic::from(ObjectProxy(obj)),
        StoreValue::Array(arr) => Dynamic::from(ArrayProxy(arr)),
        StoreValue::Foreign(foreign) => foreign_to_dynamic(foreign),
        other => from_store_value(other),
    }
}

/// Host value for a script value
///
/// Proxies unwrap to the object they proxy. Script maps and arrays become
/// new host objects. Anything else is returned as `Err`.
fn try_adopt(value: Dynamic) -> std::result::Result<StoreValue, Dynamic> {
    let value = value.flatten();

    if let Some(value) = primitive(&value) {
        return Ok(value);
    }
    if let Some(proxy) = value.read_lock::<ObjectProxy>() {
        return Ok(StoreValue::Object(proxy.0.clone()));
    }
    if let Some(proxy) = value.read_lock::<ArrayProxy>() {
        return Ok(StoreValue::Array(proxy.0.clone()));
    }
    if let Some(map) = value.read_lock::<Map>() {
        let entries = map
            .iter()
            .map(|(key, member)| (key.to_string(), adopt(member.clone())));
        return Ok(StoreValue::Object(ObjectRef::from_entries(entries)));
    }
    if let Some(items) = value.read_lock::<Array>() {
        let items = items.iter().map(|item| adopt(item.clone()));
        return Ok(StoreValue::Array(ArrayRef::from_items(items)));
    }

    Err(value)
}

/// Host value for a nested script value; unsupported values stay opaque
fn adopt(value: Dynamic) -> StoreValue {
    try_adopt(value).unwrap_or_else(|original| {
        debug!(
            kind = original.type_name(),
            "Proxy not established, keeping original value"
        );
        StoreValue::Foreign(ForeignValue::new(original))
    })
}

pub(crate) fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<ObjectProxy>("ObjectProxy")
        .register_indexer_get(|obj: &mut ObjectProxy, key: ImmutableString| obj.get(&key))
        .register_indexer_set(
            |obj: &mut ObjectProxy, key: ImmutableString, value: Dynamic| obj.set(&key, value),
        )
        .register_fn("len", |obj: &mut ObjectProxy| obj.0.len() as INT)
        .register_fn("is_empty", |obj: &mut ObjectProxy| obj.0.is_empty())
        .register_fn("keys", |obj: &mut ObjectProxy| obj.keys())
        .register_fn("contains", |obj: &mut ObjectProxy, key: &str| {
            obj.0.contains_key(key)
        })
        .register_fn("remove", |obj: &mut ObjectProxy, key: &str| obj.remove(key))
        .register_fn("to_map", |obj: &mut ObjectProxy| {
            from_store_value(StoreValue::Object(obj.0.clone()))
        })
        .register_fn("to_json", |obj: &mut ObjectProxy| {
            StoreValue::Object(obj.0.clone()).to_json().to_string()
        })
        .register_fn("==", |a: ObjectProxy, b: ObjectProxy| a.0.ptr_eq(&b.0))
        .register_fn("!=", |a: ObjectProxy, b: ObjectProxy| !a.0.ptr_eq(&b.0));

    engine
        .register_type_with_name::<ArrayProxy>("ArrayProxy")
        .register_indexer_get(|arr: &mut ArrayProxy, index: INT| arr.get(index))
        .register_indexer_set(|arr: &mut ArrayProxy, index: INT, value: Dynamic| {
            arr.set(index, value)
        })
        .register_fn("len", |arr: &mut ArrayProxy| arr.0.len() as INT)
        .register_fn("is_empty", |arr: &mut ArrayProxy| arr.0.is_empty())
        .register_fn("push", |arr: &mut ArrayProxy, value: Dynamic| {
            arr.0.push(adopt(value))
        })
        .register_fn("to_array", |arr: &mut ArrayProxy| {
            from_store_value(StoreValue::Array(arr.0.clone()))
        })
        .register_fn("to_json", |arr: &mut ArrayProxy| {
            StoreValue::Array(arr.0.clone()).to_json().to_string()
        })
        .register_fn("==", |a: ArrayProxy, b: ArrayProxy| a.0.ptr_eq(&b.0))
        .register_fn("!=", |a: ArrayProxy, b: ArrayProxy| !a.0.ptr_eq(&b.0));
}

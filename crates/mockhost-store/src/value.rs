//! Host-side value model held by stores
//!
//! Objects and arrays are shared, mutable allocations: cloning a
//! [`StoreValue::Object`] clones the handle, not the contents. Two handles
//! are the same object iff they point at the same allocation, which is what
//! lets a script-side proxy and the store observe each other's mutations.

use parking_lot::RwLock;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A value stored in a [`Store`](crate::Store)
#[derive(Clone, Default)]
pub enum StoreValue {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
    /// Shared, mutable array
    Array(ArrayRef),
    /// Shared, mutable object
    Object(ObjectRef),
    /// Value owned by another runtime, passed through untouched
    Foreign(ForeignValue),
}

impl StoreValue {
    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Foreign(_) => "foreign",
        }
    }

    /// Check for [`StoreValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as shared object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get as shared array
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as foreign handle
    pub fn as_foreign(&self) -> Option<&ForeignValue> {
        match self {
            Self::Foreign(f) => Some(f),
            _ => None,
        }
    }

    /// Convert to JSON
    ///
    /// Foreign values become `null`, as does any back-reference to an object
    /// or array that is already being converted.
    pub fn to_json(&self) -> JsonValue {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, visiting: &mut HashSet<usize>) -> JsonValue {
        match self {
            Self::Null | Self::Foreign(_) => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(a) => {
                if !visiting.insert(a.id()) {
                    return JsonValue::Null;
                }
                let items = a.items().iter().map(|v| v.to_json_inner(visiting)).collect();
                visiting.remove(&a.id());
                JsonValue::Array(items)
            }
            Self::Object(o) => {
                if !visiting.insert(o.id()) {
                    return JsonValue::Null;
                }
                let map: JsonMap<String, JsonValue> = o
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(visiting)))
                    .collect();
                visiting.remove(&o.id());
                JsonValue::Object(map)
            }
        }
    }
}

/// Equality is structural for primitives and by identity for objects,
/// arrays and foreign handles.
impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Foreign(a), Self::Foreign(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Array(a) => a.fmt(f),
            Self::Object(o) => o.fmt(f),
            Self::Foreign(v) => v.fmt(f),
        }
    }
}

impl From<bool> for StoreValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for StoreValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<ObjectRef> for StoreValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<ArrayRef> for StoreValue {
    fn from(value: ArrayRef) -> Self {
        Self::Array(value)
    }
}

impl From<JsonValue> for StoreValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => {
                Self::Array(ArrayRef::from_items(items.into_iter().map(Into::into)))
            }
            JsonValue::Object(map) => Self::Object(ObjectRef::from_entries(
                map.into_iter().map(|(k, v)| (k, v.into())),
            )),
        }
    }
}

/// Shared handle to a mutable string-keyed object
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<BTreeMap<String, StoreValue>>>);

impl ObjectRef {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object from entries
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, StoreValue)>,
        K: Into<String>,
    {
        Self(Arc::new(RwLock::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Identity of the underlying allocation
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Get a member
    pub fn get(&self, key: &str) -> Option<StoreValue> {
        self.0.read().get(key).cloned()
    }

    /// Set a member, returning the previous value
    pub fn insert(&self, key: impl Into<String>, value: StoreValue) -> Option<StoreValue> {
        self.0.write().insert(key.into(), value)
    }

    /// Remove a member
    pub fn remove(&self, key: &str) -> Option<StoreValue> {
        self.0.write().remove(key)
    }

    /// Check for a member
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    /// Member names in order
    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    /// Snapshot of the members; nested objects stay shared
    pub fn entries(&self) -> Vec<(String, StoreValue)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the object has no members
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Members are not printed: objects may contain themselves.
        f.debug_struct("ObjectRef")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("len", &self.len())
            .finish()
    }
}

/// Shared handle to a mutable array
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<StoreValue>>>);

impl ArrayRef {
    /// Create an empty array
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array from items
    pub fn from_items<I: IntoIterator<Item = StoreValue>>(items: I) -> Self {
        Self(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    /// Identity of the underlying allocation
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles refer to the same array
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Get an item
    pub fn get(&self, index: usize) -> Option<StoreValue> {
        self.0.read().get(index).cloned()
    }

    /// Replace an item; returns false when out of bounds
    pub fn set(&self, index: usize, value: StoreValue) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Append an item
    pub fn push(&self, value: StoreValue) {
        self.0.write().push(value);
    }

    /// Snapshot of the items; nested objects stay shared
    pub fn items(&self) -> Vec<StoreValue> {
        self.0.read().clone()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the array is empty
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("len", &self.len())
            .finish()
    }
}

/// Opaque value owned by another runtime
///
/// Stores never look inside; whoever put it there downcasts it back.
#[derive(Clone)]
pub struct ForeignValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ForeignValue {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the wrapped value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Rust type name of the wrapped value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles wrap the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Foreign({})", self.type_name)
    }
}

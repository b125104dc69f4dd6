//! Script bindings and their transformation into script globals

use rhai::{Dynamic, Engine, EvalAltResult, Map};
use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

/// Name of the aggregate namespace object
pub const NAMESPACE_VAR_NAME: &str = "__bindings";

/// Name of the console shim
pub const CONSOLE_VAR_NAME: &str = "console";

/// Named values handed to one script invocation
///
/// Ordered by name. Owned by the invocation that receives it.
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    values: BTreeMap<String, Dynamic>,
}

impl ScriptBindings {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a binding, replacing any previous value
    pub fn insert<T>(&mut self, name: impl Into<String>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(name.into(), Dynamic::from(value));
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.insert(name, value);
        self
    }

    /// Build bindings from the members of a JSON object
    pub fn from_json(value: serde_json::Value) -> Result<Self, Box<EvalAltResult>> {
        let serde_json::Value::Object(members) = value else {
            return Err("bindings must be a JSON object".into());
        };

        let mut bindings = Self::new();
        for (name, member) in members {
            bindings
                .values
                .insert(name, rhai::serde::to_dynamic(member)?);
        }
        Ok(bindings)
    }

    /// Get a binding
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.values.get(name)
    }

    /// Whether a binding with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, Dynamic)> for ScriptBindings {
    fn from_iter<I: IntoIterator<Item = (S, Dynamic)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Build the globals a script sees from its bindings
///
/// Every binding is exposed under its own name. With `add_prefix` the whole
/// set is also exposed as one object map named [`NAMESPACE_VAR_NAME`]. With
/// `add_shim` a [`ConsoleShim`] is added as `console`, unless the caller
/// supplied a `console` binding.
///
/// The namespace holds its own copies of the values. Reassigning a bare
/// binding, or a property of one, inside a script is not reflected through
/// `__bindings`, and the reverse. Shared host objects such as store proxies
/// and the response DSL are the exception.
pub fn transform(
    bindings: &ScriptBindings,
    add_prefix: bool,
    add_shim: bool,
) -> BTreeMap<String, Dynamic> {
    let mut globals = bindings.values.clone();

    if add_shim && !globals.contains_key(CONSOLE_VAR_NAME) {
        globals.insert(CONSOLE_VAR_NAME.to_string(), Dynamic::from(ConsoleShim));
    }

    if add_prefix {
        let namespace: Map = globals
            .iter()
            .map(|(name, value)| (name.as_str().into(), value.clone()))
            .collect();
        globals.insert(NAMESPACE_VAR_NAME.to_string(), Dynamic::from_map(namespace));
    }

    globals
}

/// `console` object forwarding script logs to tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleShim;

pub(crate) fn register_console(engine: &mut Engine) {
    engine
        .register_type_with_name::<ConsoleShim>("Console")
        .register_fn("log", |_: &mut ConsoleShim, msg: Dynamic| {
            info!(script_log = %msg);
        })
        .register_fn("info", |_: &mut ConsoleShim, msg: Dynamic| {
            info!(script_log = %msg);
        })
        .register_fn("debug", |_: &mut ConsoleShim, msg: Dynamic| {
            debug!(script_log = %msg);
        })
        .register_fn("warn", |_: &mut ConsoleShim, msg: Dynamic| {
            warn!(script_log = %msg);
        })
        .register_fn("error", |_: &mut ConsoleShim, msg: Dynamic| {
            error!(script_log = %msg);
        })
        .register_fn("trace", |_: &mut ConsoleShim, msg: Dynamic| {
            trace!(script_log = %msg);
        });
}

//! Scripting configuration

use serde::{Deserialize, Serialize};

/// Environment variable controlling the store proxy interceptor
pub const STORE_PROXY_ENV: &str = "MOCKHOST_SCRIPT_STORE_PROXY";

/// Scripting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Register the object-proxying store interceptor at startup
    #[serde(default = "default_store_proxy")]
    pub store_proxy: bool,

    /// Maximum number of operations a single script may perform
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum string length in bytes
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum object map size
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,

    /// Maximum function call nesting
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum expression nesting, applied to top-level and function bodies
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,
}

fn default_store_proxy() -> bool {
    true
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_max_string_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_collection_size() -> usize {
    10_000
}

fn default_max_call_levels() -> usize {
    32
}

fn default_max_expr_depth() -> usize {
    64
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            store_proxy: default_store_proxy(),
            max_operations: default_max_operations(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
        }
    }
}

impl ScriptingConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(STORE_PROXY_ENV);
        let store_proxy = store_proxy_enabled(raw.as_deref());
        tracing::debug!(
            env = STORE_PROXY_ENV,
            value = raw.as_deref().unwrap_or("<unset>"),
            store_proxy,
            "Resolved store proxy flag"
        );

        Self {
            store_proxy,
            ..Self::default()
        }
    }

    /// Override the store proxy flag
    pub fn with_store_proxy(mut self, enabled: bool) -> Self {
        self.store_proxy = enabled;
        self
    }

    /// Override the operation limit
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }
}

/// Interpret the raw flag value
///
/// Only an explicit `false` disables the interceptor; an absent, empty or
/// unrecognised value leaves it enabled.
pub fn store_proxy_enabled(raw: Option<&str>) -> bool {
    !matches!(raw, Some(value) if value.trim().eq_ignore_ascii_case("false"))
}

//! Script service trait and abstractions

use crate::bindings::ScriptBindings;
use crate::dsl::ResponseBehaviour;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Script identity and source text
///
/// Loading the text (from a file, config, etc.) is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    /// Name used for caching, logs and errors
    pub id: String,
    /// Script code
    pub code: String,
}

impl ScriptSource {
    /// Create a script source
    pub fn new<I: Into<String>, C: Into<String>>(id: I, code: C) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
        }
    }

    /// Create an anonymous inline script
    pub fn inline<C: Into<String>>(code: C) -> Self {
        Self::new("inline", code)
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Script execution service
///
/// One implementation per scripting engine. Every operation is synchronous
/// and may be called concurrently from any number of threads.
pub trait ScriptService: Send + Sync + fmt::Debug {
    /// Engine identity, used as the interceptor registry key
    fn impl_name(&self) -> &str;

    /// Validate a script by running its health check
    fn init_script(&self, script: &ScriptSource) -> Result<()>;

    /// Run a script and return the response behaviour it configured
    fn execute_script(
        &self,
        script: &ScriptSource,
        bindings: ScriptBindings,
    ) -> Result<ResponseBehaviour>;

    /// Prepare an eval script ahead of use
    fn init_eval_script(&self, script_id: &str, code: &str) -> Result<()> {
        let _ = (script_id, code);
        Ok(())
    }

    /// Evaluate an expression; true only if it yields exactly boolean `true`
    fn execute_eval_script(
        &self,
        script_id: &str,
        code: &str,
        bindings: ScriptBindings,
    ) -> Result<bool>;

    /// Clear compiled scripts
    fn clear_cache(&self) {}

    /// Get cache statistics (compiled scripts, hit rate, etc.)
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Cache statistics for script engines
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of compiled scripts in cache
    pub cached_scripts: usize,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Total source size of cached scripts in bytes
    pub size_bytes: usize,
}

impl CacheStats {
    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

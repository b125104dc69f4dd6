//! Shared Rhai engine with AST caching

use crate::config::ScriptingConfig;
use crate::engine::CacheStats;
use crate::error::FailureCause;
use crate::{bindings, dsl, entrypoint, proxy, stores};
use parking_lot::RwLock;
use rhai::{Dynamic, Engine, EvalAltResult, AST};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Engine identity used for interceptor registration
pub const ENGINE_NAME: &str = "rhai";

/// How a script is prepared before it is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CompileMode {
    Plain,
    EntryPoint,
}

#[derive(Debug)]
struct CachedScript {
    mode: CompileMode,
    script_id: String,
    code: String,
    ast: Arc<AST>,
}

impl CachedScript {
    fn matches(&self, mode: CompileMode, script_id: &str, code: &str) -> bool {
        self.mode == mode && self.script_id == script_id && self.code == code
    }
}

/// Rhai engine shared by every invocation
///
/// Holds registered host types and compiled scripts only; per-invocation
/// state lives in an [`ExecutionEnvironment`](crate::ExecutionEnvironment).
#[derive(Debug)]
pub struct RhaiEngine {
    /// Rhai engine instance
    engine: Engine,
    /// Compiled AST cache (hash of script id and code -> AST)
    ast_cache: RwLock<HashMap<u64, CachedScript>>,
    /// Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl RhaiEngine {
    /// Create new Rhai engine with default limits
    pub fn new() -> Self {
        Self::with_config(&ScriptingConfig::default())
    }

    /// Create engine with the limits from `config`
    pub fn with_config(config: &ScriptingConfig) -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
        engine.set_max_operations(config.max_operations);
        engine.set_max_string_size(config.max_string_size);
        engine.set_max_array_size(config.max_array_size);
        engine.set_max_map_size(config.max_map_size);
        engine.set_max_call_levels(config.max_call_levels);

        Self::register_functions(&mut engine);
        dsl::register(&mut engine);
        bindings::register_console(&mut engine);
        proxy::register(&mut engine);
        stores::register(&mut engine);

        debug!(
            max_operations = config.max_operations,
            max_call_levels = config.max_call_levels,
            "Rhai engine created"
        );

        Self {
            engine,
            ast_cache: RwLock::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Register utility functions available to every script
    fn register_functions(engine: &mut Engine) {
        engine.register_fn(
            "parse_json",
            |s: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                let value: serde_json::Value =
                    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))?;
                rhai::serde::to_dynamic(value)
            },
        );

        engine.register_fn(
            "to_json",
            |value: Dynamic| -> Result<String, Box<EvalAltResult>> {
                serde_json::to_string(&value)
                    .map_err(|e| format!("value is not JSON serializable: {e}").into())
            },
        );

        // String utilities
        engine.register_fn("base64_encode", |s: &str| -> String {
            use base64::{engine::general_purpose, Engine as _};
            general_purpose::STANDARD.encode(s.as_bytes())
        });

        engine.register_fn("base64_decode", |s: &str| -> String {
            use base64::{engine::general_purpose, Engine as _};
            general_purpose::STANDARD
                .decode(s.as_bytes())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_default()
        });

        // Utility functions
        engine.register_fn("unix_time", || -> i64 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default()
        });

        engine.register_fn("uuid", || -> String { uuid::Uuid::new_v4().to_string() });

        // Logging (for debugging scripts)
        engine.register_fn("log_debug", |msg: &str| {
            debug!(script_log = msg);
        });

        engine.register_fn("log_info", |msg: &str| {
            tracing::info!(script_log = msg);
        });

        engine.register_fn("log_warn", |msg: &str| {
            warn!(script_log = msg);
        });
    }

    /// Underlying Rhai engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get or compile the AST for a script
    pub fn compile(&self, script_id: &str, code: &str) -> Result<Arc<AST>, FailureCause> {
        self.compile_as(CompileMode::Plain, script_id, code)
    }

    /// Compile a script body wrapped with the entry-point module
    pub fn compile_entry_point(
        &self,
        script_id: &str,
        code: &str,
    ) -> Result<Arc<AST>, FailureCause> {
        self.compile_as(CompileMode::EntryPoint, script_id, code)
    }

    fn compile_as(
        &self,
        mode: CompileMode,
        script_id: &str,
        code: &str,
    ) -> Result<Arc<AST>, FailureCause> {
        let key = cache_key(mode, script_id, code);

        if let Some(cached) = self.ast_cache.read().get(&key) {
            if cached.matches(mode, script_id, code) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                trace!(script = %script_id, "AST cache hit");
                return Ok(cached.ast.clone());
            }
            warn!(script = %script_id, other = %cached.script_id, "AST cache key collision");
        }

        // Cache miss - compile
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        trace!(script = %script_id, "AST cache miss, compiling");

        let ast = self
            .engine
            .compile(code)
            .map_err(|e| FailureCause::compilation(&e))?;
        let ast = Arc::new(match mode {
            CompileMode::Plain => ast,
            CompileMode::EntryPoint => entrypoint::wrap(&self.engine, &ast)?,
        });

        self.ast_cache.write().insert(
            key,
            CachedScript {
                mode,
                script_id: script_id.to_string(),
                code: code.to_string(),
                ast: ast.clone(),
            },
        );

        debug!(script = %script_id, "Script compiled and cached");
        Ok(ast)
    }

    /// Drop all compiled scripts
    pub fn clear_cache(&self) {
        self.ast_cache.write().clear();
        debug!("Rhai AST cache cleared");
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.ast_cache.read();
        CacheStats {
            cached_scripts: cache.len(),
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
            size_bytes: cache.values().map(|c| c.code.len()).sum(),
        }
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(mode: CompileMode, script_id: &str, code: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    mode.hash(&mut hasher);
    script_id.hash(&mut hasher);
    code.hash(&mut hasher);
    hasher.finish()
}

//! Rhai script execution service

use crate::bindings::{transform, ScriptBindings};
use crate::config::ScriptingConfig;
use crate::dsl::{ResponseBehaviour, ResponseDsl, DSL_VAR_NAME};
use crate::engine::{CacheStats, ScriptService, ScriptSource};
use crate::entrypoint::EntryPoint;
use crate::environment::{EnvironmentFactory, ExecutionEnvironment, Phase};
use crate::error::{FailureCause, Result, ScriptError};
use crate::lifecycle::EngineLifecycleListener;
use crate::proxy::ObjectProxyingStore;
use crate::rhai_engine::{RhaiEngine, ENGINE_NAME};
use mockhost_store::StoreService;
use rhai::Dynamic;
use std::sync::Arc;
use tracing::{debug, trace};

/// Script service backed by one shared Rhai engine
#[derive(Debug)]
pub struct RhaiScriptService {
    config: ScriptingConfig,
    factory: EnvironmentFactory,
}

impl RhaiScriptService {
    /// Create a service with its own engine
    pub fn new(config: ScriptingConfig) -> Self {
        let engine = Arc::new(RhaiEngine::with_config(&config));
        Self::with_engine(engine, config)
    }

    /// Create a service over an existing engine
    pub fn with_engine(engine: Arc<RhaiEngine>, config: ScriptingConfig) -> Self {
        Self {
            config,
            factory: EnvironmentFactory::new(engine),
        }
    }

    /// Configuration the service was built with
    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// Shared engine
    pub fn engine(&self) -> &Arc<RhaiEngine> {
        self.factory.engine()
    }

    /// Register the object-proxying interceptor if enabled
    pub fn check_enable_store_proxy(&self, stores: &StoreService) {
        if self.config.store_proxy {
            trace!(engine = ENGINE_NAME, "Enabling object proxying store interceptor");
            stores.register_interceptor(ENGINE_NAME, ObjectProxyingStore::interceptor());
        } else {
            trace!(engine = ENGINE_NAME, "Object proxying store interceptor disabled");
        }
    }

    /// Release engine resources
    pub fn shutdown(&self) {
        self.engine().clear_cache();
        debug!("Rhai script service shut down");
    }

    /// Wrap, evaluate and resolve a script, then hand its entry point to `block`
    fn execute_entry_point<T>(
        &self,
        script: &ScriptSource,
        bindings: &ScriptBindings,
        block: impl FnOnce(&mut EntryPoint<'_>) -> std::result::Result<T, FailureCause>,
    ) -> Result<T> {
        trace!(script = %script.id, bindings = bindings.len(), "Executing script");

        let mut env = self.factory.build();
        let outcome = self.run_entry_point(&mut env, script, bindings, block);
        finish(env, &script.id, outcome)
    }

    fn run_entry_point<T>(
        &self,
        env: &mut ExecutionEnvironment,
        script: &ScriptSource,
        bindings: &ScriptBindings,
        block: impl FnOnce(&mut EntryPoint<'_>) -> std::result::Result<T, FailureCause>,
    ) -> std::result::Result<T, FailureCause> {
        env.bind(transform(bindings, true, false));

        let ast = self.engine().compile_entry_point(&script.id, &script.code)?;
        let value = env.load(ast)?;

        let mut entry_point = env.entry_point(value)?;
        block(&mut entry_point)
    }

    fn run_eval(
        &self,
        env: &mut ExecutionEnvironment,
        script_id: &str,
        code: &str,
        bindings: &ScriptBindings,
    ) -> std::result::Result<bool, FailureCause> {
        env.bind(transform(bindings, false, false));

        let ast = self.engine().compile(script_id, code)?;
        let value = env.evaluate(ast)?;
        env.advance(Phase::ResultExtracted)?;

        Ok(is_exactly_true(&value))
    }
}

/// Release the environment and wrap any failure
fn finish<T>(
    mut env: ExecutionEnvironment,
    script_id: &str,
    outcome: std::result::Result<T, FailureCause>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            trace!(script = %script_id, env = env.id(), "Script execution complete");
            Ok(value)
        }
        Err(cause) => {
            env.fail();
            debug!(script = %script_id, env = env.id(), error = %cause, "Script execution failed");
            Err(ScriptError::terminated(script_id, cause))
        }
    }
}

fn check_health(entry_point: &mut EntryPoint<'_>) -> std::result::Result<(), FailureCause> {
    if entry_point.health_check()? {
        Ok(())
    } else {
        Err(FailureCause::HealthCheck)
    }
}

fn is_exactly_true(value: &Dynamic) -> bool {
    matches!(value.clone().flatten().as_bool(), Ok(true))
}

impl ScriptService for RhaiScriptService {
    fn impl_name(&self) -> &str {
        ENGINE_NAME
    }

    fn init_script(&self, script: &ScriptSource) -> Result<()> {
        self.execute_entry_point(script, &ScriptBindings::new(), check_health)
    }

    fn execute_script(
        &self,
        script: &ScriptSource,
        mut bindings: ScriptBindings,
    ) -> Result<ResponseBehaviour> {
        bindings.insert(DSL_VAR_NAME, ResponseDsl::new());

        self.execute_entry_point(script, &bindings, |entry_point| {
            entry_point.run()?;
            entry_point.response_behaviour()
        })
    }

    fn init_eval_script(&self, script_id: &str, code: &str) -> Result<()> {
        self.engine()
            .compile(script_id, code)
            .map(|_| ())
            .map_err(|cause| ScriptError::terminated(script_id, cause))
    }

    fn execute_eval_script(
        &self,
        script_id: &str,
        code: &str,
        bindings: ScriptBindings,
    ) -> Result<bool> {
        trace!(script = %script_id, bindings = bindings.len(), "Evaluating expression");

        let mut env = self.factory.build();
        let outcome = self.run_eval(&mut env, script_id, code, &bindings);
        finish(env, script_id, outcome)
    }

    fn clear_cache(&self) {
        self.engine().clear_cache();
    }

    fn cache_stats(&self) -> CacheStats {
        self.engine().cache_stats()
    }
}

impl EngineLifecycleListener for RhaiScriptService {
    fn after_routes_configured(&self, stores: &StoreService) {
        self.check_enable_store_proxy(stores);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> RhaiScriptService {
        RhaiScriptService::new(ScriptingConfig::default())
    }

    #[test]
    fn test_impl_name() {
        assert_eq!(service().impl_name(), "rhai");
    }

    #[test]
    fn test_init_script_runs_health_check_only() {
        let service = service();
        // Would fail if run() were called with empty bindings
        let script = ScriptSource::new("t", "request.path.len()");
        service.init_script(&script).unwrap();
    }

    #[test]
    fn test_execute_script_reads_bindings() {
        let service = service();
        let script = ScriptSource::new(
            "t",
            r#"respond.withStatusCode(code).withContent(__bindings.name);"#,
        );
        let bindings = ScriptBindings::new()
            .with("code", 418_i64)
            .with("name", "teapot".to_string());

        let behaviour = service.execute_script(&script, bindings).unwrap();
        assert_eq!(behaviour.status_code, 418);
        assert_eq!(behaviour.content.as_deref(), Some("teapot"));
    }

    #[test]
    fn test_caller_cannot_replace_result_binding() {
        let service = service();
        let script = ScriptSource::new("t", "respond.withStatusCode(201);");
        let bindings = ScriptBindings::new().with(DSL_VAR_NAME, 5_i64);

        let behaviour = service.execute_script(&script, bindings).unwrap();
        assert_eq!(behaviour.status_code, 201);
    }

    #[test]
    fn test_failure_carries_cause_and_line() {
        let service = service();
        let script = ScriptSource::new("broken.rhai", "let a = 1;\nthrow \"nope\";");

        let err = service
            .execute_script(&script, ScriptBindings::new())
            .unwrap_err();

        assert_eq!(err.script(), "broken.rhai");
        match err.cause() {
            FailureCause::Invocation {
                operation,
                message,
                line,
            } => {
                assert_eq!(*operation, "run");
                assert_eq!(message, "nope");
                assert_eq!(*line, Some(2));
            }
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn test_unhealthy_entry_point_fails_every_time() {
        let service = service();
        let ast = service
            .engine()
            .compile(
                "unhealthy.rhai",
                r#"
                fn unhealthy() { false }
                #{ healthCheck: Fn("unhealthy"), run: Fn("unhealthy") }
                "#,
            )
            .unwrap();

        for _ in 0..3 {
            let mut env = service.factory.build();
            let outcome = env
                .evaluate(ast.clone())
                .and_then(|value| check_health(&mut env.entry_point(value)?));

            let err = finish(env, "unhealthy.rhai", outcome).unwrap_err();
            assert_eq!(err.script(), "unhealthy.rhai");
            assert_eq!(err.cause(), &FailureCause::HealthCheck);
        }
    }

    #[test]
    fn test_script_functions_are_callable() {
        let service = service();
        let script = ScriptSource::new(
            "helpers.rhai",
            "fn status() { 201 }\nfn greet(name) { `hi ${name}` }\nrespond.withStatusCode(status()).withContent(greet(name));",
        );
        let bindings = ScriptBindings::new().with("name", "ada".to_string());

        service.init_script(&script).unwrap();
        let behaviour = service.execute_script(&script, bindings).unwrap();
        assert_eq!(behaviour.status_code, 201);
        assert_eq!(behaviour.content.as_deref(), Some("hi ada"));
    }

    #[test]
    fn test_stray_brace_does_not_escape_body() {
        let service = service();
        let script = ScriptSource::new("escape.rhai", "}\nfn __health_check() { false }\n{");

        let err = service.init_script(&script).unwrap_err();
        assert!(matches!(err.cause(), FailureCause::Evaluation { .. }));
    }

    #[test]
    fn test_namespace_holds_copies_of_bindings() {
        let service = service();
        let script = ScriptSource::new(
            "t",
            r#"request.path = "/x"; respond.withContent(request.path + " " + __bindings.request.path);"#,
        );
        let bindings = ScriptBindings::from_json(serde_json::json!({ "request": { "path": "/orig" } }))
            .unwrap();

        let behaviour = service.execute_script(&script, bindings).unwrap();
        assert_eq!(behaviour.content.as_deref(), Some("/x /orig"));
    }

    #[test]
    fn test_eval_script_semantics() {
        let service = service();
        let bindings = || ScriptBindings::new().with("x", 3_i64);

        assert!(service.execute_eval_script("e", "x == 3", bindings()).unwrap());
        assert!(!service.execute_eval_script("e", "x == 4", bindings()).unwrap());
        assert!(!service.execute_eval_script("e", "1", bindings()).unwrap());
        assert!(!service.execute_eval_script("e", "\"true\"", bindings()).unwrap());
        assert!(!service.execute_eval_script("e", "", bindings()).unwrap());
        assert!(service
            .execute_eval_script("e", "__bindings.x == 3", bindings())
            .is_err());
    }

    #[test]
    fn test_init_eval_script_precompiles() {
        let service = service();
        service.init_eval_script("e", "true").unwrap();
        assert_eq!(service.cache_stats().cached_scripts, 1);

        service.execute_eval_script("e", "true", ScriptBindings::new()).unwrap();
        assert_eq!(service.cache_stats().hits, 1);

        assert!(service.init_eval_script("bad", "let = ;").is_err());
    }

    #[test]
    fn test_store_proxy_registration() {
        let stores = StoreService::new();
        service().after_routes_configured(&stores);
        assert!(stores.has_interceptor(ENGINE_NAME));

        let stores = StoreService::new();
        RhaiScriptService::new(ScriptingConfig::default().with_store_proxy(false))
            .after_routes_configured(&stores);
        assert!(!stores.has_interceptor(ENGINE_NAME));
    }

    #[test]
    fn test_shutdown_clears_cache() {
        let service = service();
        service.init_eval_script("e", "true").unwrap();
        service.shutdown();
        assert_eq!(service.cache_stats().cached_scripts, 0);
    }
}

//! Script entry point: the `healthCheck()` / `run()` protocol
//!
//! A compiled script body is merged with a small entry-point module:
//!
//! ```text
//! fn __health_check() { true }
//! fn __run() { }
//! fn __entry_point() { #{ healthCheck: Fn("__health_check"), run: Fn("__run") } }
//! ```
//!
//! Loading a script calls `__entry_point()` only. The body's top-level
//! statements run when `run()` is called, directly in the invocation scope,
//! so bindings are plain variables there. Functions the script declares stay
//! at global level and, as always in Rhai, see only their parameters.

use crate::dsl::{ResponseBehaviour, ResponseDsl, DSL_VAR_NAME};
use crate::environment::{ExecutionEnvironment, Phase};
use crate::error::FailureCause;
use rhai::{Dynamic, Engine, FnPtr, Map, AST};

/// Function returning the entry-point object of a wrapped script
pub const ENTRY_POINT_FN: &str = "__entry_point";

const HEALTH_CHECK_MEMBER: &str = "healthCheck";
const RUN_MEMBER: &str = "run";

const ENTRY_MODULE: &str = r#"
fn __health_check() { true }
fn __run() { }
fn __entry_point() { #{ healthCheck: Fn("__health_check"), run: Fn("__run") } }
"#;

/// Merge the entry-point module into a compiled script body
///
/// Entry-point functions replace script functions of the same name.
pub fn wrap(engine: &Engine, body: &AST) -> Result<AST, FailureCause> {
    let entry = engine
        .compile(ENTRY_MODULE)
        .map_err(|e| FailureCause::compilation(&e))?;
    Ok(body.merge(&entry))
}

/// Resolved `healthCheck()` / `run()` pair
///
/// Borrows its environment, so it cannot outlive the invocation.
#[derive(Debug)]
pub struct EntryPoint<'env> {
    env: &'env mut ExecutionEnvironment,
    health_check: FnPtr,
    run: FnPtr,
}

impl<'env> EntryPoint<'env> {
    /// Shape-check an evaluated value
    pub(crate) fn resolve(
        env: &'env mut ExecutionEnvironment,
        value: Dynamic,
    ) -> Result<Self, FailureCause> {
        let value = value.flatten();
        let type_name = value.type_name();
        let members = value.try_cast::<Map>().ok_or_else(|| {
            FailureCause::contract(format!(
                "script evaluated to `{type_name}`, expected an object exposing {HEALTH_CHECK_MEMBER}() and {RUN_MEMBER}()"
            ))
        })?;

        let health_check = function_member(&members, HEALTH_CHECK_MEMBER)?;
        let run = function_member(&members, RUN_MEMBER)?;

        env.advance(Phase::EntryPointResolved)?;
        Ok(Self {
            env,
            health_check,
            run,
        })
    }

    /// Call `healthCheck()`; it must return a boolean
    pub fn health_check(&mut self) -> Result<bool, FailureCause> {
        self.env.advance(Phase::Invoked)?;
        let value = self
            .env
            .call(HEALTH_CHECK_MEMBER, &self.health_check, false)?
            .flatten();

        value.as_bool().map_err(|type_name| {
            FailureCause::contract(format!(
                "{HEALTH_CHECK_MEMBER}() returned `{type_name}`, expected a boolean"
            ))
        })
    }

    /// Run the script body, then call `run()`; return values are ignored
    pub fn run(&mut self) -> Result<(), FailureCause> {
        self.env.advance(Phase::Invoked)?;
        let _ = self.env.call(RUN_MEMBER, &self.run, true)?;
        Ok(())
    }

    /// Read the behaviour configured through the result binding
    pub fn response_behaviour(&mut self) -> Result<ResponseBehaviour, FailureCause> {
        let dsl = self
            .env
            .binding(DSL_VAR_NAME)
            .map(Dynamic::flatten)
            .and_then(|value| value.try_cast::<ResponseDsl>())
            .ok_or_else(|| {
                FailureCause::contract(format!(
                    "result binding `{DSL_VAR_NAME}` does not hold a response DSL"
                ))
            })?;

        self.env.advance(Phase::ResultExtracted)?;
        Ok(dsl.response_behaviour())
    }
}

fn function_member(members: &Map, name: &str) -> Result<FnPtr, FailureCause> {
    let member = members
        .get(name)
        .ok_or_else(|| FailureCause::contract(format!("missing member `{name}`")))?;

    member.clone().flatten().try_cast::<FnPtr>().ok_or_else(|| {
        FailureCause::contract(format!(
            "member `{name}` is `{}`, expected a function",
            member.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentFactory;
    use crate::rhai_engine::RhaiEngine;
    use std::sync::Arc;

    #[test]
    fn test_wrap_keeps_script_functions() {
        let engine = Engine::new();
        let body = engine.compile("fn status() { 201 }\nstatus()").unwrap();

        let wrapped = wrap(&engine, &body).unwrap();
        let names: Vec<String> = wrapped.iter_functions().map(|f| f.name.to_string()).collect();

        for name in ["status", "__health_check", "__run", ENTRY_POINT_FN] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    fn evaluate(code: &str) -> (EnvironmentFactory, Dynamic) {
        let factory = EnvironmentFactory::new(Arc::new(RhaiEngine::new()));
        let value = {
            let mut env = factory.build();
            let ast = factory.engine().compile("t", code).unwrap();
            env.evaluate(ast).unwrap()
        };
        (factory, value)
    }

    #[test]
    fn test_rejects_non_object() {
        let (factory, value) = evaluate("42");
        let mut env = factory.build();

        let err = env.entry_point(value).unwrap_err();
        assert!(err.to_string().contains("i64"));
    }

    #[test]
    fn test_rejects_missing_or_non_function_members() {
        let (factory, value) = evaluate(r#"#{ healthCheck: Fn("x") }"#);
        let mut env = factory.build();
        assert!(matches!(
            env.entry_point(value),
            Err(FailureCause::EntryPointContract { .. })
        ));

        let (factory, value) = evaluate(r#"#{ healthCheck: Fn("x"), run: 1 }"#);
        let mut env = factory.build();
        assert!(matches!(
            env.entry_point(value),
            Err(FailureCause::EntryPointContract { .. })
        ));
    }

    #[test]
    fn test_load_does_not_run_body() {
        let factory = EnvironmentFactory::new(Arc::new(RhaiEngine::new()));
        let mut env = factory.build();
        let ast = factory
            .engine()
            .compile_entry_point("t", r#"throw "body ran";"#)
            .unwrap();

        let value = env.load(ast).unwrap();
        let mut entry_point = env.entry_point(value).unwrap();
        assert!(entry_point.health_check().unwrap());
    }

    #[test]
    fn test_repeated_invocation_is_contract_violation() {
        let factory = EnvironmentFactory::new(Arc::new(RhaiEngine::new()));
        let mut env = factory.build();
        let ast = factory.engine().compile_entry_point("t", "1 + 1").unwrap();

        let value = env.load(ast).unwrap();
        let mut entry_point = env.entry_point(value).unwrap();
        entry_point.run().unwrap();

        assert!(matches!(
            entry_point.run(),
            Err(FailureCause::EntryPointContract { .. })
        ));
        assert!(matches!(
            entry_point.health_check(),
            Err(FailureCause::EntryPointContract { .. })
        ));
    }
}

//! Per-invocation execution environments

use crate::entrypoint::{EntryPoint, ENTRY_POINT_FN};
use crate::error::FailureCause;
use crate::rhai_engine::RhaiEngine;
use rhai::{CallFnOptions, Dynamic, FnPtr, Scope, AST};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Lifecycle phase of one invocation
///
/// Phases only move forward; a repeated step is an entry-point contract
/// violation. Eval scripts skip the entry-point phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Environment built, nothing evaluated yet
    Created,
    /// Script evaluated
    Evaluated,
    /// Entry point found and shape-checked
    EntryPointResolved,
    /// `healthCheck()` or `run()` called
    Invoked,
    /// Result read out of the environment
    ResultExtracted,
    /// Environment dropped after success
    Released,
    /// Something failed; the environment is still dropped
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Evaluated => "evaluated",
            Self::EntryPointResolved => "entry-point-resolved",
            Self::Invoked => "invoked",
            Self::ResultExtracted => "result-extracted",
            Self::Released => "released",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Builds fresh environments over the shared engine
#[derive(Debug)]
pub struct EnvironmentFactory {
    engine: Arc<RhaiEngine>,
    next_id: AtomicU64,
}

impl EnvironmentFactory {
    /// Create a factory over the shared engine
    pub fn new(engine: Arc<RhaiEngine>) -> Self {
        Self {
            engine,
            next_id: AtomicU64::new(1),
        }
    }

    /// Shared engine
    pub fn engine(&self) -> &Arc<RhaiEngine> {
        &self.engine
    }

    /// Build a fresh environment for one invocation
    ///
    /// Every host type registered on the engine is reachable from scripts run
    /// in it. Nothing restricts filesystem or network access beyond what the
    /// registered functions themselves do.
    ///
    /// Script bodies are compiled on their own before the entry-point module
    /// is merged in, so a script cannot close an enclosing block or define
    /// functions other than at its own top level.
    pub fn build(&self) -> ExecutionEnvironment {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(env = id, "Execution environment created");

        ExecutionEnvironment {
            id,
            engine: self.engine.clone(),
            scope: Scope::new(),
            ast: None,
            phase: Phase::Created,
        }
    }
}

/// Isolated scope for exactly one invocation
///
/// Released on drop, on every path.
#[derive(Debug)]
pub struct ExecutionEnvironment {
    id: u64,
    engine: Arc<RhaiEngine>,
    scope: Scope<'static>,
    ast: Option<Arc<AST>>,
    phase: Phase,
}

impl ExecutionEnvironment {
    /// Invocation id used in logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Install script globals
    pub fn bind(&mut self, globals: BTreeMap<String, Dynamic>) {
        for (name, value) in globals {
            self.scope.push_dynamic(name, value);
        }
    }

    /// Current value of a global
    pub fn binding(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    /// Run the top level of a compiled script
    pub fn evaluate(&mut self, ast: Arc<AST>) -> Result<Dynamic, FailureCause> {
        trace!(env = self.id, "Evaluating script");
        let value = self
            .engine
            .engine()
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)
            .map_err(|e| FailureCause::evaluation(&e))?;

        self.ast = Some(ast);
        self.advance(Phase::Evaluated)?;
        Ok(value)
    }

    /// Load a wrapped script and return its entry-point object
    ///
    /// Only the entry-point function is called; the script body does not run.
    pub fn load(&mut self, ast: Arc<AST>) -> Result<Dynamic, FailureCause> {
        trace!(env = self.id, "Loading script");
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let value = self
            .engine
            .engine()
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &ast, ENTRY_POINT_FN, ())
            .map_err(|e| FailureCause::evaluation(&e))?;

        self.ast = Some(ast);
        self.advance(Phase::Evaluated)?;
        Ok(value)
    }

    /// Shape-check the evaluated value and resolve its entry point
    pub fn entry_point(&mut self, value: Dynamic) -> Result<EntryPoint<'_>, FailureCause> {
        EntryPoint::resolve(self, value)
    }

    /// Mark the invocation as failed
    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    pub(crate) fn advance(&mut self, phase: Phase) -> Result<(), FailureCause> {
        if phase <= self.phase {
            return Err(FailureCause::contract(format!(
                "cannot enter phase {phase} after {}",
                self.phase
            )));
        }
        trace!(env = self.id, from = %self.phase, to = %phase, "Phase change");
        self.phase = phase;
        Ok(())
    }

    /// Call a script function, running the script body first if `run_body`
    pub(crate) fn call(
        &mut self,
        operation: &'static str,
        function: &FnPtr,
        run_body: bool,
    ) -> Result<Dynamic, FailureCause> {
        let ast = self
            .ast
            .clone()
            .ok_or_else(|| FailureCause::contract("no script has been evaluated"))?;

        trace!(env = self.id, operation, function = function.fn_name(), run_body, "Invoking");
        let options = CallFnOptions::new().eval_ast(run_body).rewind_scope(true);

        self.engine
            .engine()
            .call_fn_with_options::<Dynamic>(
                options,
                &mut self.scope,
                &ast,
                function.fn_name(),
                function.curry().to_vec(),
            )
            .map_err(|e| FailureCause::invocation(operation, &e))
    }
}

impl Drop for ExecutionEnvironment {
    fn drop(&mut self) {
        trace!(env = self.id, final_phase = %self.phase, "Execution environment released");
        if self.phase != Phase::Failed {
            self.phase = Phase::Released;
        }
    }
}

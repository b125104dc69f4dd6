//! Script execution error types

use rhai::{EvalAltResult, ParseError, Position};
use std::fmt;

/// Script execution result type
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Failure returned by every script operation
///
/// Callers see one kind of error whatever went wrong; the underlying
/// [`FailureCause`] is kept as the error source for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("Script execution terminated abnormally: {script}")]
pub struct ScriptError {
    script: String,
    #[source]
    cause: FailureCause,
}

impl ScriptError {
    /// Wrap a cause raised while running `script`
    pub fn terminated<S: Into<String>>(script: S, cause: FailureCause) -> Self {
        Self {
            script: script.into(),
            cause,
        }
    }

    /// Identity of the failed script
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Original cause
    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }

    /// Consume into the original cause
    pub fn into_cause(self) -> FailureCause {
        self.cause
    }
}

/// What actually went wrong inside a script invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// `healthCheck()` returned false
    HealthCheck,

    /// Script failed to compile or evaluate
    Evaluation {
        /// Error message
        message: String,
        /// Line number if available
        line: Option<usize>,
        /// Column number if available
        column: Option<usize>,
    },

    /// Evaluated script does not have the required shape
    EntryPointContract {
        /// Error message
        message: String,
    },

    /// `healthCheck()` or `run()` raised an error
    Invocation {
        /// Entry-point operation that failed
        operation: &'static str,
        /// Error message
        message: String,
        /// Script line where error occurred
        line: Option<usize>,
    },
}

impl FailureCause {
    /// Create an evaluation failure from a compile error
    pub fn compilation(err: &ParseError) -> Self {
        let pos = err.position();
        Self::Evaluation {
            message: err.err_type().to_string(),
            line: pos.line(),
            column: pos.position(),
        }
    }

    /// Create an evaluation failure from a runtime error at top level
    pub fn evaluation(err: &EvalAltResult) -> Self {
        let pos = err.position();
        Self::Evaluation {
            message: message_of(err),
            line: pos.line(),
            column: pos.position(),
        }
    }

    /// Create an entry-point contract violation
    pub fn contract<S: Into<String>>(message: S) -> Self {
        Self::EntryPointContract {
            message: message.into(),
        }
    }

    /// Create an invocation failure for an entry-point operation
    pub fn invocation(operation: &'static str, err: &EvalAltResult) -> Self {
        Self::Invocation {
            operation,
            message: message_of(err),
            line: innermost_position(err).line(),
        }
    }

    /// Script line the failure points at, if any
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Evaluation { line, .. } | Self::Invocation { line, .. } => *line,
            _ => None,
        }
    }
}

/// Errors raised inside a called function are wrapped once per call frame;
/// report the innermost one.
fn innermost(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => innermost(inner),
        other => other,
    }
}

fn innermost_position(err: &EvalAltResult) -> Position {
    innermost(err).position()
}

fn message_of(err: &EvalAltResult) -> String {
    match innermost(err) {
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthCheck => write!(f, "Script health check failed"),
            Self::Evaluation {
                message,
                line,
                column,
            } => {
                write!(f, "Script evaluation error: {}", message)?;
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                    if let Some(col) = column {
                        write!(f, ", column {}", col)?;
                    }
                }
                Ok(())
            }
            Self::EntryPointContract { message } => {
                write!(f, "Script entry point contract violated: {}", message)
            }
            Self::Invocation {
                operation,
                message,
                line,
            } => {
                write!(f, "Script {}() error: {}", operation, message)?;
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FailureCause {}

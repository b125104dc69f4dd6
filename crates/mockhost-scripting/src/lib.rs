//! # mockhost Scripting
//!
//! Runs user-supplied Rhai scripts that decide how a mock endpoint responds.
//!
//! ## Features
//!
//! - One shared, thread-safe engine with AST caching
//! - A fresh, isolated scope per invocation
//! - `healthCheck()` / `run()` entry-point protocol
//! - Response DSL bound as `respond`
//! - Optional store interceptor sharing live objects between scripts and host
//! - One uniform error type keeping the original cause
//!
//! ## Example
//!
//! ```rust
//! use mockhost_scripting::prelude::*;
//!
//! let service = RhaiScriptService::new(ScriptingConfig::default());
//! let script = ScriptSource::new("hello.rhai", r#"respond.withStatusCode(201).withContent("hi " + name);"#);
//!
//! service.init_script(&script).unwrap();
//! let behaviour = service
//!     .execute_script(&script, ScriptBindings::new().with("name", "ada".to_string()))
//!     .unwrap();
//!
//! assert_eq!(behaviour.status_code, 201);
//! assert_eq!(behaviour.content.as_deref(), Some("hi ada"));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod bindings;
pub mod config;
pub mod dsl;
pub mod engine;
pub mod entrypoint;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod proxy;
pub mod rhai_engine;
pub mod service;
pub mod stores;

pub use bindings::{transform, ConsoleShim, ScriptBindings};
pub use config::ScriptingConfig;
pub use dsl::{ResponseBehaviour, ResponseBehaviourType, ResponseDsl};
pub use engine::{CacheStats, ScriptService, ScriptSource};
pub use entrypoint::EntryPoint;
pub use environment::{EnvironmentFactory, ExecutionEnvironment, Phase};
pub use error::{FailureCause, Result, ScriptError};
pub use lifecycle::EngineLifecycleListener;
pub use proxy::ObjectProxyingStore;
pub use rhai_engine::RhaiEngine;
pub use service::RhaiScriptService;
pub use stores::StoresBinding;

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::bindings::ScriptBindings;
    pub use crate::config::ScriptingConfig;
    pub use crate::dsl::ResponseBehaviour;
    pub use crate::engine::{ScriptService, ScriptSource};
    pub use crate::error::{Result, ScriptError};
    pub use crate::lifecycle::EngineLifecycleListener;
    pub use crate::service::RhaiScriptService;
    pub use crate::stores::StoresBinding;
}

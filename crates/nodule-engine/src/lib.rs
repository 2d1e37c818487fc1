//! nodule-engine - on-demand module execution.
//!
//! This crate runs already-transformed modules fetched from a host (usually a
//! dev server), one at a time and only when something imports them.
//!
//! # Features
//!
//! - **Module cache**: one record per module id with import/importer edges
//! - **At-most-once execution**: concurrent importers share one in-flight execution
//! - **Circular imports**: cycles see partially-populated exports instead of deadlocking
//! - **Invalidation**: evict a module and its dependents, or its dependencies
//! - **Externals**: pre-built packages and builtins are loaded natively
//!
//! # Example
//!
//! ```no_run
//! use futures_util::FutureExt;
//! use futures_util::future::BoxFuture;
//! use nodule_engine::{ExecutionContext, FetchResult, ModuleHost, ModuleRunner};
//! use nodule_runtime::{RuntimeResult, Value};
//! use std::sync::Arc;
//!
//! struct DevServer;
//!
//! impl ModuleHost for DevServer {
//!     fn fetch_module<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<FetchResult>> {
//!         async move { Ok(FetchResult::code(format!("// {id}"))) }.boxed()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     let evaluator = |ctx: ExecutionContext, _code: Arc<str>| {
//!         async move { ctx.define_export("ok", || Value::from(true)) }.boxed()
//!     };
//!     let runner = ModuleRunner::new(Arc::new(DevServer), Arc::new(evaluator));
//!
//!     let exports = runner.execute_id("/src/main.js").await?;
//!     assert_eq!(exports.get("ok").as_bool(), Some(true));
//!     Ok(())
//! }
//! ```

pub mod builtins;
pub mod context;
pub mod evaluator;
pub mod external;
pub mod graph;
pub mod host;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod stubs;

pub use builtins::BuiltinRegistry;
pub use context::{CjsGlobals, ExecutionContext, HotFactory, ImportFn, ImportMeta};
pub use evaluator::ModuleEvaluator;
pub use external::ExternalExecutor;
pub use graph::{find_cycle, is_circular};
pub use host::{FetchResult, HotContext, ModuleHost, NoopHotContext, ResolvedId};
pub use resolver::Resolver;
pub use runner::{ModuleRunner, ModuleRunnerBuilder};
pub use store::{ModulePromise, ModuleRecord, ModuleStore, RESOLVE_SENTINEL_PREFIX, RecordHandle};
pub use stubs::{client_stub, default_request_stubs};

// Re-export error types from nodule-runtime for convenience
pub use nodule_runtime::{RuntimeError, RuntimeResult};

//! The code-running seam.
//!
//! The runner decides *when* a module runs and *what* it can see; an
//! evaluator decides *how* its code runs. Closures work as evaluators:
//!
//! ```
//! use futures_util::FutureExt;
//! use nodule_engine::{ExecutionContext, ModuleEvaluator};
//! use nodule_runtime::Value;
//! use std::sync::Arc;
//!
//! let evaluator = |ctx: ExecutionContext, _code: Arc<str>| {
//!     async move { ctx.define_export("answer", || Value::from(42)) }.boxed()
//! };
//! fn assert_evaluator(_: &dyn ModuleEvaluator) {}
//! assert_evaluator(&evaluator);
//! ```

use std::sync::Arc;

use futures_util::future::BoxFuture;
use nodule_runtime::RuntimeResult;

use crate::context::ExecutionContext;

/// Runs module code against its execution context.
///
/// `code` has any leading shebang blanked out. The returned future settles
/// once the module body (including its top-level awaits) has finished.
pub trait ModuleEvaluator: Send + Sync {
    fn evaluate(
        &self,
        ctx: ExecutionContext,
        code: Arc<str>,
    ) -> BoxFuture<'static, RuntimeResult<()>>;
}

impl<F> ModuleEvaluator for F
where
    F: Fn(ExecutionContext, Arc<str>) -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync,
{
    fn evaluate(
        &self,
        ctx: ExecutionContext,
        code: Arc<str>,
    ) -> BoxFuture<'static, RuntimeResult<()>> {
        self(ctx, code)
    }
}

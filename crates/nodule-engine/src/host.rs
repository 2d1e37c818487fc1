//! Host collaborator interfaces.
//!
//! The runner never transforms source itself. A [`ModuleHost`] (usually a
//! dev server behind an RPC channel) hands it transformed code, resolves bare
//! specifiers, and optionally supplies `import.meta.hot` objects.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use nodule_runtime::{RuntimeResult, Value};
use serde::{Deserialize, Serialize};

use crate::runner::ModuleRunner;

/// Response of [`ModuleHost::fetch_module`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Transformed source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Load this identifier natively instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externalize: Option<String>,
}

impl FetchResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            externalize: None,
        }
    }

    pub fn externalize(id: impl Into<String>) -> Self {
        Self {
            code: None,
            externalize: Some(id.into()),
        }
    }
}

/// Response of [`ModuleHost::resolve_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedId {
    pub id: String,
}

impl ResolvedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Source of transformed modules.
pub trait ModuleHost: Send + Sync {
    /// Fetch transformed code for `id`, or an instruction to externalize it.
    fn fetch_module<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<FetchResult>>;

    /// Resolve a raw specifier. `None` means "use the specifier as-is".
    fn resolve_id<'a>(
        &'a self,
        _id: &'a str,
        _importer: Option<&'a str>,
    ) -> BoxFuture<'a, RuntimeResult<Option<ResolvedId>>> {
        async { Ok(None) }.boxed()
    }

    /// Create the `import.meta.hot` object for a module.
    fn create_hot_context(&self, _runner: &ModuleRunner, _id: &str) -> Option<Arc<dyn HotContext>> {
        None
    }
}

/// `import.meta.hot` as seen by executed code. The runner only hands it out;
/// every method is a no-op unless the host implements it.
pub trait HotContext: Send + Sync {
    fn data(&self) -> Value {
        Value::Undefined
    }

    /// `hot.accept(cb)`
    fn accept(&self, _callback: Option<Value>) {}

    /// `hot.accept(deps, cb)`
    fn accept_deps(&self, _deps: &[String], _callback: Option<Value>) {}

    fn dispose(&self, _callback: Value) {}

    fn prune(&self, _callback: Value) {}

    fn decline(&self) {}

    fn invalidate(&self, _message: Option<&str>) {}

    fn on(&self, _event: &str, _callback: Value) {}

    fn send(&self, _event: &str, _data: Value) {}
}

/// Hot context that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHotContext;

impl HotContext for NoopHotContext {}

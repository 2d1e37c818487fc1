//! What a module's code sees while it runs.
//!
//! An [`ExecutionContext`] carries the module-scope globals: the exports
//! namespace, `import.meta`, the import entry points and, for code that
//! uses them, `require` / `exports` / `module`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use nodule_runtime::{
    CjsExports, CjsModule, ModuleFormat, Namespace, Promise, RuntimeError, RuntimeResult, Value,
};
use parking_lot::Mutex;

use crate::host::HotContext;

type ImportCallback = dyn Fn(String) -> BoxFuture<'static, RuntimeResult<Value>> + Send + Sync;

/// An import entry point: takes a specifier, settles to the module namespace.
#[derive(Clone)]
pub struct ImportFn(Arc<ImportCallback>);

impl ImportFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, RuntimeResult<Value>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, specifier: impl Into<String>) -> BoxFuture<'static, RuntimeResult<Value>> {
        (self.0)(specifier.into())
    }

    /// Expose as a callable value that returns a promise.
    pub fn to_value(&self, name: &str) -> Value {
        let import = self.clone();
        Value::function(name, move |args| {
            let specifier = match args.first() {
                Some(Value::String(s)) => s.to_string(),
                Some(other) => other.to_string(),
                None => {
                    return Err(RuntimeError::type_error(
                        "The \"id\" argument must be of type string. Received undefined",
                    ));
                }
            };
            Ok(Value::Promise(Promise::new(import.call(specifier))))
        })
    }
}

impl fmt::Debug for ImportFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImportFn")
    }
}

/// Produces the hot context the first time `import.meta.hot` is read.
pub type HotFactory = Arc<dyn Fn() -> Option<Arc<dyn HotContext>> + Send + Sync>;

#[derive(Default)]
struct HotSlot {
    context: Option<Arc<dyn HotContext>>,
    factory: Option<HotFactory>,
}

/// `import.meta`
#[derive(Clone)]
pub struct ImportMeta {
    url: String,
    hot: Arc<Mutex<HotSlot>>,
}

impl ImportMeta {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hot: Arc::default(),
        }
    }

    pub fn with_hot_factory(self, factory: HotFactory) -> Self {
        self.hot.lock().factory = Some(factory);
        self
    }

    /// `import.meta.url`
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `import.meta.hot`, created on first access.
    pub fn hot(&self) -> Option<Arc<dyn HotContext>> {
        let factory = {
            let mut slot = self.hot.lock();
            if let Some(context) = &slot.context {
                return Some(context.clone());
            }
            slot.factory.clone()?
        };

        let context = factory()?;
        let mut slot = self.hot.lock();
        slot.factory = None;
        Some(slot.context.get_or_insert(context).clone())
    }

    /// Replace `import.meta.hot`.
    pub fn set_hot(&self, context: Arc<dyn HotContext>) {
        let mut slot = self.hot.lock();
        slot.factory = None;
        slot.context = Some(context);
    }

    /// Whether the hot context has been created.
    pub fn has_hot(&self) -> bool {
        self.hot.lock().context.is_some()
    }
}

impl fmt::Debug for ImportMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportMeta")
            .field("url", &self.url)
            .field("hot", &self.has_hot())
            .finish()
    }
}

/// `require`, `exports` and `module` of a CommonJS-shaped scope.
#[derive(Clone)]
pub struct CjsGlobals {
    pub require: ImportFn,
    pub exports: CjsExports,
    pub module: CjsModule,
}

impl fmt::Debug for CjsGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CjsGlobals")
            .field("exports", self.exports.namespace())
            .finish_non_exhaustive()
    }
}

/// Module-scope globals handed to a [`ModuleEvaluator`](crate::ModuleEvaluator).
#[derive(Clone)]
pub struct ExecutionContext {
    id: String,
    filename: PathBuf,
    dirname: PathBuf,
    format: ModuleFormat,
    exports: Namespace,
    import_meta: ImportMeta,
    import: ImportFn,
    cjs: Option<CjsGlobals>,
}

impl ExecutionContext {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<PathBuf>,
        format: ModuleFormat,
        exports: Namespace,
        import_meta: ImportMeta,
        import: ImportFn,
    ) -> Self {
        let filename = filename.into();
        let dirname = filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            id: id.into(),
            filename,
            dirname,
            format,
            exports,
            import_meta,
            import,
            cjs: None,
        }
    }

    pub fn with_commonjs(mut self, globals: CjsGlobals) -> Self {
        self.cjs = Some(globals);
        self
    }

    /// Module id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `__filename`
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// `__dirname`
    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    pub fn format(&self) -> ModuleFormat {
        self.format
    }

    /// The module's own namespace (`__vite_ssr_exports__`).
    pub fn exports(&self) -> &Namespace {
        &self.exports
    }

    pub fn import_meta(&self) -> &ImportMeta {
        &self.import_meta
    }

    /// Static import of `specifier`.
    pub fn import(&self, specifier: &str) -> BoxFuture<'static, RuntimeResult<Value>> {
        self.import.call(specifier)
    }

    /// `import(specifier)`; shares the static import path and its cache.
    pub fn dynamic_import(&self, specifier: &str) -> BoxFuture<'static, RuntimeResult<Value>> {
        self.import.call(specifier)
    }

    /// `export * from '...'`
    pub fn export_all(&self, source: &Value) {
        self.exports.export_all(source);
    }

    /// `export const name = ...` as a live binding.
    pub fn define_export<F>(&self, name: &str, getter: F) -> RuntimeResult<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.exports.define_export(name, getter)
    }

    /// `require(specifier)`
    pub fn require(&self, specifier: &str) -> BoxFuture<'static, RuntimeResult<Value>> {
        match &self.cjs {
            Some(cjs) => cjs.require.call(specifier),
            None => {
                let err = RuntimeError::execution(&self.id, "require is not defined");
                async move { Err(err) }.boxed()
            }
        }
    }

    pub fn commonjs(&self) -> Option<&CjsGlobals> {
        self.cjs.as_ref()
    }

    /// `module`
    pub fn module(&self) -> Option<&CjsModule> {
        self.cjs.as_ref().map(|cjs| &cjs.module)
    }

    /// `exports`
    pub fn cjs_exports(&self) -> Option<&CjsExports> {
        self.cjs.as_ref().map(|cjs| &cjs.exports)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("format", &self.format)
            .field("exports", &self.exports)
            .field("commonjs", &self.cjs.is_some())
            .finish()
    }
}

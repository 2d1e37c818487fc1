//! The module runner.
//!
//! [`ModuleRunner::cached_request`] is the single entry point through which
//! every module (entry files and their dependencies alike) is executed. It
//! guarantees one execution per module id for the lifetime of its cache
//! entry, hands partially-populated exports to circular importers, and
//! reports modules that take suspiciously long to settle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use nodule_runtime::ids::{clean_url, file_url, file_url_to_path, slash};
use nodule_runtime::{
    CjsExports, CjsModule, ModuleFormat, Namespace, RunnerConfig, RuntimeError, RuntimeResult,
    Value, strip_shebang,
};
use tracing::{debug, trace, warn};

use crate::builtins::BuiltinRegistry;
use crate::context::{CjsGlobals, ExecutionContext, ImportFn, ImportMeta};
use crate::evaluator::ModuleEvaluator;
use crate::external::{ExternalExecutor, cjs_interop};
use crate::graph;
use crate::host::ModuleHost;
use crate::resolver::Resolver;
use crate::store::{ModulePromise, ModuleStore, RecordHandle};
use crate::stubs::default_request_stubs;

struct RunnerInner {
    config: Arc<RunnerConfig>,
    host: Arc<dyn ModuleHost>,
    evaluator: Arc<dyn ModuleEvaluator>,
    module_cache: ModuleStore,
    resolver: Resolver,
    external: ExternalExecutor,
    request_stubs: HashMap<String, Value>,
}

/// Executes transformed modules on demand.
///
/// Cloning is cheap; clones share caches and configuration.
#[derive(Clone)]
pub struct ModuleRunner {
    inner: Arc<RunnerInner>,
}

/// Handle kept by the closures given to executed code.
#[derive(Clone)]
struct WeakRunner(Weak<RunnerInner>);

impl WeakRunner {
    fn upgrade(&self) -> RuntimeResult<ModuleRunner> {
        self.0
            .upgrade()
            .map(|inner| ModuleRunner { inner })
            .ok_or_else(|| RuntimeError::internal("module runner was dropped"))
    }
}

/// Builder for [`ModuleRunner`].
pub struct ModuleRunnerBuilder {
    host: Arc<dyn ModuleHost>,
    evaluator: Arc<dyn ModuleEvaluator>,
    config: RunnerConfig,
    module_cache: Option<ModuleStore>,
    external_cache: Option<ModuleStore>,
    request_stubs: HashMap<String, Value>,
    builtins: BuiltinRegistry,
}

impl ModuleRunnerBuilder {
    /// Starts from [`RunnerConfig::from_env`].
    pub fn new(host: Arc<dyn ModuleHost>, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        Self {
            host,
            evaluator,
            config: RunnerConfig::from_env(),
            module_cache: None,
            external_cache: None,
            request_stubs: default_request_stubs(),
            builtins: BuiltinRegistry::new(),
        }
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a module cache with other runners.
    pub fn module_cache(mut self, cache: ModuleStore) -> Self {
        self.module_cache = Some(cache);
        self
    }

    /// Share an external-module cache with other runners.
    pub fn external_cache(mut self, cache: ModuleStore) -> Self {
        self.external_cache = Some(cache);
        self
    }

    /// Replace the request stub table.
    pub fn request_stubs(mut self, stubs: HashMap<String, Value>) -> Self {
        self.request_stubs = stubs;
        self
    }

    /// Add (or replace) one request stub.
    pub fn request_stub(mut self, id: impl Into<String>, exports: Value) -> Self {
        self.request_stubs.insert(id.into(), exports);
        self
    }

    /// Register a builtin module.
    pub fn builtin(self, name: &str, exports: Value) -> Self {
        self.builtins.register(name, exports);
        self
    }

    pub fn builtins(mut self, registry: BuiltinRegistry) -> Self {
        self.builtins = registry;
        self
    }

    pub fn build(self) -> ModuleRunner {
        let config = Arc::new(self.config);
        let module_cache = self.module_cache.unwrap_or_default();
        let resolver = Resolver::new(module_cache.clone(), self.host.clone(), config.clone());
        let external = ExternalExecutor::new(
            self.evaluator.clone(),
            config.clone(),
            self.builtins,
            self.external_cache.unwrap_or_default(),
        );

        ModuleRunner {
            inner: Arc::new(RunnerInner {
                config,
                host: self.host,
                evaluator: self.evaluator,
                module_cache,
                resolver,
                external,
                request_stubs: self.request_stubs,
            }),
        }
    }
}

impl ModuleRunner {
    /// Runner with default configuration.
    pub fn new(host: Arc<dyn ModuleHost>, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        Self::builder(host, evaluator).build()
    }

    pub fn builder(
        host: Arc<dyn ModuleHost>,
        evaluator: Arc<dyn ModuleEvaluator>,
    ) -> ModuleRunnerBuilder {
        ModuleRunnerBuilder::new(host, evaluator)
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    pub fn module_cache(&self) -> &ModuleStore {
        &self.inner.module_cache
    }

    pub fn external_cache(&self) -> &ModuleStore {
        self.inner.external.cache()
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        self.inner.external.builtins()
    }

    fn downgrade(&self) -> WeakRunner {
        WeakRunner(Arc::downgrade(&self.inner))
    }

    /// Execute a file on disk. Relative paths are taken from `root`.
    pub async fn execute_file(&self, file: impl AsRef<Path>) -> RuntimeResult<Value> {
        let file = file.as_ref();
        let absolute = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.inner.config.root.join(file)
        };
        let url = format!("/@fs/{}", slash(&absolute.to_string_lossy()));
        self.cached_request(url.clone(), url, Vec::new()).await
    }

    /// Execute a module by id, resolving it first.
    pub async fn execute_id(&self, raw_id: &str) -> RuntimeResult<Value> {
        let (id, url) = self.resolve_url(raw_id, None).await?;
        self.cached_request(id, url, Vec::new()).await
    }

    pub fn should_resolve_id(&self, id: &str, importer: Option<&str>) -> bool {
        self.inner.resolver.should_resolve_id(id, importer)
    }

    /// Resolve `id` as imported from `importer` into `(id, fs_path)`.
    pub async fn resolve_url(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> RuntimeResult<(String, String)> {
        self.inner.resolver.resolve_url(id, importer).await
    }

    /// Whether dependents of `path` see an interop view of `namespace`.
    pub fn should_interop(&self, path: &str, namespace: &Value) -> bool {
        nodule_runtime::should_interop(path, namespace, self.inner.config.interop_default)
    }

    /// Load an externalized module natively.
    pub async fn interoped_import(&self, identifier: &str) -> RuntimeResult<Value> {
        self.inner.external.interoped_import(identifier).await
    }

    /// Exports of `fs_path`, executing it (once) if needed.
    ///
    /// `callstack` lists the module ids currently executing, innermost last.
    pub fn cached_request(
        &self,
        id: String,
        fs_path: String,
        callstack: Vec<String>,
    ) -> BoxFuture<'static, RuntimeResult<Value>> {
        let this = self.clone();
        async move { this.cached_request_inner(id, fs_path, callstack).await }.boxed()
    }

    async fn cached_request_inner(
        &self,
        id: String,
        fs_path: String,
        callstack: Vec<String>,
    ) -> RuntimeResult<Value> {
        let cache = &self.inner.module_cache;
        let module_id = cache.normalize_path(&fs_path);
        let record = cache.get_by_module_id(&module_id);

        if let Some(importee) = callstack.last() {
            record.lock().importers.insert(importee.clone());
        }

        let on_stack = callstack.contains(&module_id);
        let cycle = if on_stack {
            None
        } else {
            graph::find_cycle(cache, &module_id, &callstack)
        };
        if on_stack || cycle.is_some() {
            trace!(target: "nodule::graph", module = %module_id, chain = ?cycle, "circular import");
            let record = record.lock();
            if let Some(exports) = &record.exports {
                return Ok(exports.clone());
            }
            if on_stack {
                return Ok(Value::Undefined);
            }
        }

        let promise = self.claim_execution(&record, id, fs_path.clone(), callstack.clone());
        self.await_with_stale_warning(&fs_path, &callstack, promise)
            .await
    }

    /// The in-flight execution of a record, started if there is none.
    ///
    /// Returns an already-settled future when the record holds final exports.
    fn claim_execution(
        &self,
        record: &RecordHandle,
        id: String,
        fs_path: String,
        callstack: Vec<String>,
    ) -> ModulePromise {
        let mut state = record.lock();
        if state.evaluated && state.promise.is_none() {
            if let Some(exports) = &state.exports {
                let exports = exports.clone();
                return async move { Ok(exports) }.boxed().shared();
            }
        }
        if let Some(promise) = &state.promise {
            return promise.clone();
        }

        let this = self.clone();
        let handle = record.clone();
        let promise = async move {
            let result = this.direct_request(id, fs_path, callstack).await;
            handle.lock().settle(&result);
            result
        }
        .boxed()
        .shared();

        state.promise = Some(promise.clone());
        state.evaluated = false;
        promise
    }

    async fn await_with_stale_warning(
        &self,
        fs_path: &str,
        callstack: &[String],
        mut promise: ModulePromise,
    ) -> RuntimeResult<Value> {
        if !self.inner.config.debug {
            return promise.await;
        }

        let limit = self.inner.config.stale_warning();
        match tokio::time::timeout(limit, &mut promise).await {
            Ok(result) => result,
            Err(_) => {
                let stack: Vec<String> = callstack
                    .iter()
                    .map(String::as_str)
                    .chain([fs_path])
                    .rev()
                    .map(|p| format!("  - {p}"))
                    .collect();
                warn!(
                    target: "nodule::runner",
                    "[nodule] module {fs_path} takes over {}ms to load.\nstack:\n{}",
                    limit.as_millis(),
                    stack.join("\n")
                );
                promise.await
            }
        }
    }

    /// Request made on behalf of an executing module.
    pub fn dependency_request(
        &self,
        id: String,
        fs_path: String,
        callstack: Vec<String>,
    ) -> BoxFuture<'static, RuntimeResult<Value>> {
        self.cached_request(id, fs_path, callstack)
    }

    /// Fetch and execute a module unconditionally.
    pub async fn direct_request(
        &self,
        id: String,
        fs_path: String,
        callstack: Vec<String>,
    ) -> RuntimeResult<Value> {
        let cache = &self.inner.module_cache;
        let module_id = cache.normalize_path(&fs_path);
        let mut callstack = callstack;
        callstack.push(module_id.clone());
        let record = cache.get_by_module_id(&module_id);

        if let Some(stub) = self.inner.request_stubs.get(&id) {
            return Ok(stub.clone());
        }

        let fetched = self.inner.host.fetch_module(&id).await?;

        if let Some(externalize) = fetched.externalize {
            debug!(
                target: "nodule::native",
                id = %id,
                externalize = %externalize,
                "loading natively"
            );
            let exports = self.inner.external.interoped_import(&externalize).await?;
            record.lock().exports = Some(exports.clone());
            return Ok(exports);
        }

        let Some(transformed) = fetched.code else {
            let importer = callstack.len().checked_sub(2).map(|i| callstack[i].as_str());
            return Err(RuntimeError::fetch_failed(id, importer));
        };

        let module_path = clean_url(&module_id).to_string();
        let href = file_url(&module_path, &self.inner.config.root);
        let filename = file_url_to_path(&href);
        let format = ModuleFormat::from_extension(module_path.rsplit_once('.').map(|(_, ext)| ext))
            .unwrap_or_default();

        let exports = Namespace::new();
        let interop = cjs_interop(&module_path, &self.inner.config);
        let cjs_exports = CjsExports::new(exports.clone(), interop);
        let module = CjsModule::new(cjs_exports.clone());

        {
            let mut record = record.lock();
            record.code = Some(Arc::from(transformed.as_str()));
            record.exports = Some(Value::Namespace(exports.clone()));
            record.format = Some(format);
        }

        let callstack = Arc::new(callstack);
        let import = self.import_fn(&module_id, &fs_path, callstack);
        let require = self
            .inner
            .external
            .require_fn(&slash(&filename.to_string_lossy()), Arc::new(Vec::new()));

        let weak = self.downgrade();
        let hot_id = module_id.clone();
        let meta = ImportMeta::new(href).with_hot_factory(Arc::new(move || {
            let runner = weak.upgrade().ok()?;
            runner.inner.host.create_hot_context(&runner, &hot_id)
        }));

        debug!(target: "nodule::execute", filename = %filename.display());

        let ctx = ExecutionContext::new(module_id, filename, format, exports.clone(), meta, import)
            .with_commonjs(CjsGlobals {
                require,
                exports: cjs_exports,
                module,
            });
        let code: Arc<str> = Arc::from(strip_shebang(&transformed));
        self.inner.evaluator.evaluate(ctx, code).await?;

        Ok(Value::Namespace(exports))
    }

    /// Import entry point for the module `module_id` (requested as `fs_path`).
    fn import_fn(&self, module_id: &str, fs_path: &str, callstack: Arc<Vec<String>>) -> ImportFn {
        let weak = self.downgrade();
        let module_id = module_id.to_string();
        let fs_path = fs_path.to_string();
        ImportFn::new(move |dep| {
            let weak = weak.clone();
            let module_id = module_id.clone();
            let fs_path = fs_path.clone();
            let callstack = callstack.clone();
            async move {
                let runner = weak.upgrade()?;
                let (dep_id, dep_fs_path) = runner.resolve_url(&dep, Some(&fs_path)).await?;
                runner.inner.module_cache.link(&module_id, &dep_fs_path);
                runner
                    .dependency_request(dep_id, dep_fs_path, callstack.as_ref().clone())
                    .await
            }
            .boxed()
        })
    }
}

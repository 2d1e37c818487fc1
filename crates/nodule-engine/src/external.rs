//! Native loading of modules the host asked us to externalize.
//!
//! Externals are pre-built files (usually under `node_modules`) and platform
//! builtins. They bypass the host's transform pipeline: files are read from
//! disk, sniffed for ESM syntax and handed to the evaluator as-is. Their
//! records live in a cache of their own, keyed by filesystem path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use nodule_runtime::ids::{file_url, file_url_to_path, slash};
use nodule_runtime::{
    CjsExports, CjsModule, ModuleFormat, Namespace, Object, RunnerConfig, RuntimeError,
    RuntimeResult, Value, interop_module, is_node_builtin, require_value, should_interop,
    strip_shebang,
};
use oxc_resolver::{ResolveOptions, Resolver as PackageResolver};
use tracing::{debug, trace};

use crate::builtins::BuiltinRegistry;
use crate::context::{CjsGlobals, ExecutionContext, ImportFn, ImportMeta};
use crate::evaluator::ModuleEvaluator;
use crate::graph;
use crate::store::{ModulePromise, ModuleStore};

/// Whether `exports.default = x` in a CommonJS scope at `path` should also
/// promote the keys of `x` to named exports.
pub(crate) fn cjs_interop(path: &str, config: &RunnerConfig) -> bool {
    should_interop(
        path,
        &Value::object([("default", Value::Undefined)]),
        config.interop_default,
    )
}

fn extensions() -> Vec<String> {
    [".js", ".mjs", ".cjs", ".json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn conditions(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

struct ExternalInner {
    cache: ModuleStore,
    builtins: BuiltinRegistry,
    evaluator: Arc<dyn ModuleEvaluator>,
    config: Arc<RunnerConfig>,
    /// `import` / `import()` from an external
    esm_resolver: PackageResolver,
    /// `require()` from an external
    cjs_resolver: PackageResolver,
}

/// Loads externalized modules through the platform's own module rules.
#[derive(Clone)]
pub struct ExternalExecutor {
    inner: Arc<ExternalInner>,
}

impl ExternalExecutor {
    pub fn new(
        evaluator: Arc<dyn ModuleEvaluator>,
        config: Arc<RunnerConfig>,
        builtins: BuiltinRegistry,
        cache: ModuleStore,
    ) -> Self {
        let esm_options = ResolveOptions {
            extensions: extensions(),
            condition_names: conditions(&["import", "module", "node", "default"]),
            ..ResolveOptions::default()
        };
        let cjs_options = ResolveOptions {
            extensions: extensions(),
            condition_names: conditions(&["require", "node", "default"]),
            ..ResolveOptions::default()
        };

        Self {
            inner: Arc::new(ExternalInner {
                cache,
                builtins,
                evaluator,
                config,
                esm_resolver: PackageResolver::new(esm_options),
                cjs_resolver: PackageResolver::new(cjs_options),
            }),
        }
    }

    /// Records of loaded externals, keyed by path (builtins by name).
    pub fn cache(&self) -> &ModuleStore {
        &self.inner.cache
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.inner.builtins
    }

    fn is_builtin(&self, identifier: &str) -> bool {
        is_node_builtin(identifier) || self.inner.builtins.contains(identifier)
    }

    /// Load `identifier` (builtin name, path or `file:` URL) and return its
    /// raw namespace.
    pub fn import(&self, identifier: &str) -> BoxFuture<'static, RuntimeResult<Value>> {
        self.load(identifier.to_string(), Arc::new(Vec::new()))
    }

    /// Load `identifier` and present it the way a transformed module would
    /// be presented to its dependents.
    pub async fn interoped_import(&self, identifier: &str) -> RuntimeResult<Value> {
        let namespace = self.import(identifier).await?;
        Ok(self.interop(identifier, namespace))
    }

    fn interop(&self, path: &str, namespace: Value) -> Value {
        if !should_interop(path, &namespace, self.inner.config.interop_default) {
            return namespace;
        }
        match interop_module(&namespace) {
            Ok(view) => Value::Interop(view),
            Err(err) => {
                debug!(target: "nodule::interop", path, error = %err, "interop skipped");
                namespace
            }
        }
    }

    fn load(
        &self,
        identifier: String,
        chain: Arc<Vec<String>>,
    ) -> BoxFuture<'static, RuntimeResult<Value>> {
        if self.is_builtin(&identifier) {
            let result = self.builtin_import(&identifier);
            return async move { result }.boxed();
        }

        let cache = &self.inner.cache;
        let key = slash(&file_url_to_path(&identifier).to_string_lossy());
        let record = cache.get(&key);
        let in_chain = chain.contains(&key);
        let cycle = if in_chain {
            None
        } else {
            graph::find_cycle(cache, &cache.normalize_path(&key), &chain)
        };
        if cycle.is_some() {
            trace!(
                target: "nodule::graph",
                module = %key,
                chain = ?cycle,
                "circular external import"
            );
        }
        let circular = in_chain || cycle.is_some();

        let promise: ModulePromise = {
            let mut record = record.lock();
            if let Some(exports) = &record.exports {
                if circular || (record.evaluated && record.promise.is_none()) {
                    let exports = exports.clone();
                    return async move { Ok(exports) }.boxed();
                }
            } else if in_chain {
                return async { Ok(Value::Undefined) }.boxed();
            }

            match &record.promise {
                Some(promise) => promise.clone(),
                None => {
                    let this = self.clone();
                    let path = key.clone();
                    let promise = async move {
                        let result = this.execute(&path, chain).await;
                        this.inner.cache.update(&path, |r| r.settle(&result));
                        result
                    }
                    .boxed()
                    .shared();
                    record.promise = Some(promise.clone());
                    record.evaluated = false;
                    promise
                }
            }
        };

        promise.boxed()
    }

    fn builtin_import(&self, name: &str) -> RuntimeResult<Value> {
        let bare = name.strip_prefix("node:").unwrap_or(name);
        let record = self.inner.cache.get(&format!("node:{bare}"));
        let mut record = record.lock();
        if let Some(exports) = &record.exports {
            return Ok(exports.clone());
        }

        let module = self
            .inner
            .builtins
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownBuiltin(name.to_string()))?;
        let namespace = Value::Namespace(Namespace::synthetic(&module, true));
        trace!(target: "nodule::native", builtin = name, "wrapped builtin");

        record.format = Some(ModuleFormat::Builtin);
        record.exports = Some(namespace.clone());
        record.evaluated = true;
        Ok(namespace)
    }

    async fn execute(&self, path: &str, chain: Arc<Vec<String>>) -> RuntimeResult<Value> {
        let source = tokio::fs::read_to_string(path).await?;

        if path.ends_with(".json") {
            let json: serde_json::Value = serde_json::from_str(&source)
                .map_err(|err| RuntimeError::execution(path, err.to_string()))?;
            let namespace = Value::Namespace(Namespace::synthetic(&Value::from(json), true));
            self.inner.cache.update(path, |r| {
                r.format = Some(ModuleFormat::CommonJS);
                r.exports = Some(namespace.clone());
            });
            return Ok(namespace);
        }

        let format = ModuleFormat::detect(path, &source);
        let exports = Namespace::new();
        if format.is_commonjs() {
            exports.set("default", Value::Object(Object::new()))?;
        }
        let code: Arc<str> = Arc::from(strip_shebang(&source));
        self.inner.cache.update(path, |r| {
            r.format = Some(format);
            r.exports = Some(Value::Namespace(exports.clone()));
            r.code = Some(code.clone());
        });

        let mut inner_chain = chain.as_ref().clone();
        inner_chain.push(path.to_string());
        let chain = Arc::new(inner_chain);

        debug!(
            target: "nodule::native",
            path,
            format = format.as_str(),
            "executing external module"
        );

        let import = self.import_fn(path, chain.clone());
        let meta = ImportMeta::new(file_url(path, &self.inner.config.root));
        let mut ctx = ExecutionContext::new(path, path, format, exports.clone(), meta, import);
        if format.is_commonjs() {
            let interop = cjs_interop(path, &self.inner.config);
            let cjs_exports = CjsExports::new(exports.clone(), interop);
            ctx = ctx.with_commonjs(CjsGlobals {
                require: self.require_fn(path, chain),
                module: CjsModule::new(cjs_exports.clone()),
                exports: cjs_exports,
            });
        }

        self.inner.evaluator.evaluate(ctx, code).await?;
        Ok(Value::Namespace(exports))
    }

    /// Record that the external at `referrer` imports `resolved`.
    fn link(&self, referrer: &str, resolved: &str) {
        if !self.is_builtin(resolved) {
            self.inner.cache.link(referrer, resolved);
        }
    }

    fn import_fn(&self, referrer: &str, chain: Arc<Vec<String>>) -> ImportFn {
        let this = self.clone();
        let referrer = referrer.to_string();
        ImportFn::new(move |specifier| {
            let this = this.clone();
            let referrer = referrer.clone();
            let chain = chain.clone();
            async move {
                let resolved = this.resolve(&specifier, &referrer, ModuleFormat::ESM)?;
                this.link(&referrer, &resolved);
                let namespace = this.load(resolved.clone(), chain).await?;
                Ok(this.interop(&resolved, namespace))
            }
            .boxed()
        })
    }

    /// `require` for code at `referrer`: builtins come back raw, everything
    /// else as its `module.exports`.
    pub fn require_fn(&self, referrer: &str, chain: Arc<Vec<String>>) -> ImportFn {
        let this = self.clone();
        let referrer = referrer.to_string();
        ImportFn::new(move |specifier| {
            let this = this.clone();
            let referrer = referrer.clone();
            let chain = chain.clone();
            async move {
                let resolved = this.resolve(&specifier, &referrer, ModuleFormat::CommonJS)?;
                if this.is_builtin(&resolved) {
                    return this
                        .inner
                        .builtins
                        .get(&resolved)
                        .ok_or(RuntimeError::UnknownBuiltin(resolved));
                }
                this.link(&referrer, &resolved);
                let namespace = this.load(resolved, chain).await?;
                Ok(require_value(&namespace))
            }
            .boxed()
        })
    }

    /// Resolve `specifier` as imported from the file `referrer`, using the
    /// package conditions of `format`.
    pub fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        format: ModuleFormat,
    ) -> RuntimeResult<String> {
        if self.is_builtin(specifier) {
            return Ok(specifier.to_string());
        }
        if specifier.starts_with("file:") {
            return Ok(slash(&file_url_to_path(specifier).to_string_lossy()));
        }

        let base_dir = Path::new(referrer)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.inner.config.root.clone());
        let resolver = match format {
            ModuleFormat::CommonJS => &self.inner.cjs_resolver,
            _ => &self.inner.esm_resolver,
        };

        match resolver.resolve(&base_dir, specifier) {
            Ok(resolution) => {
                let path = canonicalize_path(&resolution.full_path());
                Ok(slash(&path.to_string_lossy()))
            }
            Err(err) => {
                trace!(
                    target: "nodule::resolve",
                    specifier,
                    referrer,
                    error = %err,
                    "package resolution failed"
                );
                Err(RuntimeError::not_found(specifier, Some(referrer)))
            }
        }
    }
}

fn canonicalize_path(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use nodule_engine::{
    ExecutionContext, FetchResult, HotContext, ModuleEvaluator, ModuleHost, ModuleRunner,
    ModuleRunnerBuilder, NoopHotContext, ResolvedId,
};
use nodule_runtime::ids::{clean_url, normalize_module_id};
use nodule_runtime::{RunnerConfig, RuntimeError, RuntimeResult, is_node_builtin};
use parking_lot::Mutex;

/// Root under which nothing exists, so every id goes through the host.
pub const ROOT: &str = "/nonexistent-nodule-root";

fn key(id: &str) -> String {
    normalize_module_id(clean_url(id))
}

/// Dev server stand-in with canned responses.
#[derive(Default)]
pub struct MockHost {
    modules: Mutex<HashMap<String, FetchResult>>,
    aliases: Mutex<HashMap<(String, Option<String>), String>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
    resolve_calls: Mutex<Vec<(String, Option<String>)>>,
    hot_enabled: AtomicBool,
    hot_created: AtomicUsize,
}

impl MockHost {
    pub fn code(&self, id: &str, code: &str) {
        self.modules.lock().insert(key(id), FetchResult::code(code));
    }

    pub fn externalize(&self, id: &str, target: &str) {
        self.modules
            .lock()
            .insert(key(id), FetchResult::externalize(target));
    }

    /// Neither code nor an externalize hint.
    pub fn empty(&self, id: &str) {
        self.modules.lock().insert(key(id), FetchResult::default());
    }

    pub fn alias(&self, specifier: &str, importer: Option<&str>, target: &str) {
        self.aliases.lock().insert(
            (specifier.to_string(), importer.map(str::to_string)),
            target.to_string(),
        );
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().insert(key(id));
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().remove(&key(id));
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches.lock().get(&key(id)).copied().unwrap_or_default()
    }

    pub fn resolve_calls(&self) -> Vec<(String, Option<String>)> {
        self.resolve_calls.lock().clone()
    }

    pub fn enable_hot(&self) {
        self.hot_enabled.store(true, Ordering::SeqCst);
    }

    pub fn hot_contexts_created(&self) -> usize {
        self.hot_created.load(Ordering::SeqCst)
    }
}

impl ModuleHost for MockHost {
    fn fetch_module<'a>(&'a self, id: &'a str) -> BoxFuture<'a, RuntimeResult<FetchResult>> {
        async move {
            let key = key(id);
            *self.fetches.lock().entry(key.clone()).or_default() += 1;
            if self.failing.lock().contains(&key) {
                return Err(RuntimeError::from(anyhow::anyhow!(
                    "connection reset while fetching {id}"
                )));
            }
            if let Some(result) = self.modules.lock().get(&key) {
                return Ok(result.clone());
            }
            if is_node_builtin(id) {
                return Ok(FetchResult::externalize(id));
            }
            Err(RuntimeError::internal(format!("no such module in mock host: {id}")))
        }
        .boxed()
    }

    fn resolve_id<'a>(
        &'a self,
        id: &'a str,
        importer: Option<&'a str>,
    ) -> BoxFuture<'a, RuntimeResult<Option<ResolvedId>>> {
        async move {
            let call = (id.to_string(), importer.map(str::to_string));
            self.resolve_calls.lock().push(call.clone());
            Ok(self.aliases.lock().get(&call).map(ResolvedId::new))
        }
        .boxed()
    }

    fn create_hot_context(&self, _runner: &ModuleRunner, _id: &str) -> Option<Arc<dyn HotContext>> {
        if !self.hot_enabled.load(Ordering::SeqCst) {
            return None;
        }
        self.hot_created.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(NoopHotContext))
    }
}

pub type Script =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync>;

/// Evaluator that runs a Rust closure registered for each module's code.
#[derive(Default)]
pub struct ScriptedEvaluator {
    scripts: Mutex<HashMap<String, Script>>,
    runs: Mutex<HashMap<String, usize>>,
    order: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn script<F>(&self, code: &str, f: F)
    where
        F: Fn(ExecutionContext) -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync + 'static,
    {
        self.scripts.lock().insert(code.trim().to_string(), Arc::new(f));
    }

    pub fn runs(&self, code: &str) -> usize {
        self.runs.lock().get(code.trim()).copied().unwrap_or_default()
    }

    /// Module ids in the order their code started running.
    pub fn order(&self) -> Vec<String> {
        self.order.lock().clone()
    }
}

impl ModuleEvaluator for ScriptedEvaluator {
    fn evaluate(
        &self,
        ctx: ExecutionContext,
        code: Arc<str>,
    ) -> BoxFuture<'static, RuntimeResult<()>> {
        let code = code.trim().to_string();
        *self.runs.lock().entry(code.clone()).or_default() += 1;
        self.order.lock().push(ctx.id().to_string());

        let script = self.scripts.lock().get(&code).cloned();
        match script {
            Some(script) => script(ctx),
            None => {
                let err = RuntimeError::execution(ctx.id(), format!("no script for `{code}`"));
                async move { Err(err) }.boxed()
            }
        }
    }
}

/// Host and evaluator wired together: `module(id, ..)` registers both the
/// code the host serves and the behavior that code has.
#[derive(Default)]
pub struct Fixture {
    pub host: Arc<MockHost>,
    pub evaluator: Arc<ScriptedEvaluator>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    fn code_for(id: &str) -> String {
        format!("// {}", key(id))
    }

    pub fn module<F>(&self, id: &str, f: F)
    where
        F: Fn(ExecutionContext) -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync + 'static,
    {
        let code = Self::code_for(id);
        self.host.code(id, &code);
        self.evaluator.script(&code, f);
    }

    /// A module with no imports and no exports.
    pub fn leaf(&self, id: &str) {
        self.module(id, |_| async { Ok(()) }.boxed());
    }

    pub fn runs(&self, id: &str) -> usize {
        self.evaluator.runs(&Self::code_for(id))
    }

    pub fn config() -> RunnerConfig {
        RunnerConfig::default().root(ROOT)
    }

    pub fn builder(&self) -> ModuleRunnerBuilder {
        ModuleRunner::builder(self.host.clone(), self.evaluator.clone()).config(Self::config())
    }

    pub fn runner(&self) -> ModuleRunner {
        self.builder().build()
    }

    pub fn runner_with(&self, config: RunnerConfig) -> ModuleRunner {
        self.builder().config(config).build()
    }
}

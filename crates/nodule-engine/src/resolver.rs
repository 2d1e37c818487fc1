//! Specifier resolution.
//!
//! Turns a raw import specifier into `(id, fs_path)`. Only specifiers that are
//! not already files on disk are sent to the host.

use std::sync::Arc;

use nodule_runtime::ids::{
    VALID_ID_PREFIX, is_internal_request, normalize_request_id, to_file_path,
};
use nodule_runtime::{RunnerConfig, RuntimeError, RuntimeResult, is_node_builtin};
use tracing::trace;

use crate::host::ModuleHost;
use crate::store::{ModuleRecord, ModuleStore, RESOLVE_SENTINEL_PREFIX};

/// Resolves import specifiers against the filesystem and the host.
#[derive(Clone)]
pub struct Resolver {
    store: ModuleStore,
    host: Arc<dyn ModuleHost>,
    config: Arc<RunnerConfig>,
}

impl Resolver {
    pub fn new(store: ModuleStore, host: Arc<dyn ModuleHost>, config: Arc<RunnerConfig>) -> Self {
        Self {
            store,
            host,
            config,
        }
    }

    /// Internal requests, builtins and `data:` URLs are used verbatim.
    pub fn should_resolve_id(&self, id: &str, _importer: Option<&str>) -> bool {
        !is_internal_request(id) && !is_node_builtin(id) && !id.starts_with("data:")
    }

    /// Resolve `id` as imported from `importer`.
    ///
    /// A `resolve:<id>` placeholder record marks the resolution as in flight
    /// until this returns.
    pub async fn resolve_url(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> RuntimeResult<(String, String)> {
        let sentinel = format!("{RESOLVE_SENTINEL_PREFIX}{id}");
        self.store.set_by_module_id(&sentinel, ModuleRecord::resolving());
        let store = self.store.clone();
        let _guard = scopeguard::guard(sentinel, move |key| {
            store.delete_by_module_id(&key);
        });

        self.resolve_specifier(id, importer).await
    }

    async fn resolve_specifier(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> RuntimeResult<(String, String)> {
        // `/@id/` ids are already resolved by the host; an importer would skew it
        let importer = if id.starts_with(VALID_ID_PREFIX) {
            None
        } else {
            importer
        };
        let base = self.config.base.as_deref();
        let dep = normalize_request_id(id, base);
        if !self.should_resolve_id(&dep, importer) {
            return Ok((dep.clone(), dep));
        }

        let file = to_file_path(&dep, &self.config.root);
        if file.exists {
            return Ok((dep, file.path));
        }

        match self.host.resolve_id(id, importer).await? {
            Some(resolved) => {
                let resolved_id = normalize_request_id(&resolved.id, base);
                trace!(
                    target: "nodule::resolve",
                    specifier = id,
                    importer,
                    resolved = %resolved_id
                );
                Ok((resolved_id.clone(), resolved_id))
            }
            None if self.config.strict_resolution => Err(RuntimeError::not_found(id, importer)),
            None => Ok((dep.clone(), dep)),
        }
    }
}

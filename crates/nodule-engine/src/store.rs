//! Module record store.
//!
//! One [`ModuleRecord`] per normalized module id, each behind its own mutex.
//! Locks are always taken map first, then record, and are never held across
//! an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nodule_runtime::ids::normalize_module_id;
use nodule_runtime::value::SharedResult;
use nodule_runtime::{ModuleFormat, RuntimeResult, SourceMap, Value, extract_source_map};
use parking_lot::Mutex;
use tracing::debug;

/// In-flight execution shared by every concurrent importer.
pub type ModulePromise = SharedResult;

/// Shared handle to a record.
pub type RecordHandle = Arc<Mutex<ModuleRecord>>;

/// Prefix of the placeholder records kept while a specifier is being resolved.
pub const RESOLVE_SENTINEL_PREFIX: &str = "resolve:";

/// Cached state of one module.
#[derive(Default)]
pub struct ModuleRecord {
    /// Transformed (or on-disk) source
    pub code: Option<Arc<str>>,
    /// Exports object, set once when execution begins
    pub exports: Option<Value>,
    /// Execution in progress
    pub promise: Option<ModulePromise>,
    pub evaluated: bool,
    pub resolving: bool,
    pub format: Option<ModuleFormat>,
    /// Modules this one imported
    pub imports: HashSet<String>,
    /// Modules that imported this one
    pub importers: HashSet<String>,
    /// Source map extracted from `code`
    pub map: Option<SourceMap>,
}

impl ModuleRecord {
    /// Placeholder for a specifier whose resolution is outstanding.
    pub fn resolving() -> Self {
        Self {
            resolving: true,
            ..Default::default()
        }
    }

    /// Drop execution state and edges, keeping the record itself.
    pub fn invalidate(&mut self) {
        self.evaluated = false;
        self.resolving = false;
        self.promise = None;
        self.exports = None;
        self.imports.clear();
        self.importers.clear();
    }

    /// Record the outcome of an execution.
    ///
    /// A failure before `exports` existed (resolution or fetch) drops the
    /// promise so the next request starts over. A failure of the module's own
    /// code keeps the rejected promise, so later requests see the same error.
    pub fn settle(&mut self, result: &RuntimeResult<Value>) {
        self.evaluated = true;
        match result {
            Ok(value) => {
                if self.exports.is_none() {
                    self.exports = Some(value.clone());
                }
                self.promise = None;
            }
            Err(_) if self.exports.is_none() => self.promise = None,
            Err(_) => {}
        }
    }
}

/// Map of module id to record.
#[derive(Clone, Default)]
pub struct ModuleStore {
    records: Arc<Mutex<HashMap<String, RecordHandle>>>,
}

impl ModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_path(&self, fs_path: &str) -> String {
        normalize_module_id(fs_path)
    }

    /// Record for a filesystem path, created if absent.
    pub fn get(&self, fs_path: &str) -> RecordHandle {
        self.get_by_module_id(&self.normalize_path(fs_path))
    }

    /// Record for an already-normalized id, created if absent.
    pub fn get_by_module_id(&self, module_id: &str) -> RecordHandle {
        self.records
            .lock()
            .entry(module_id.to_string())
            .or_default()
            .clone()
    }

    /// Record for a path without creating one.
    pub fn peek(&self, fs_path: &str) -> Option<RecordHandle> {
        self.records.lock().get(&self.normalize_path(fs_path)).cloned()
    }

    pub fn contains(&self, fs_path: &str) -> bool {
        self.records.lock().contains_key(&self.normalize_path(fs_path))
    }

    /// Merge changes into a record, creating it if absent.
    pub fn update<F>(&self, fs_path: &str, f: F)
    where
        F: FnOnce(&mut ModuleRecord),
    {
        let record = self.get(fs_path);
        f(&mut record.lock());
    }

    pub fn set(&self, fs_path: &str, record: ModuleRecord) {
        self.set_by_module_id(&self.normalize_path(fs_path), record);
    }

    pub fn set_by_module_id(&self, module_id: &str, record: ModuleRecord) {
        self.records
            .lock()
            .insert(module_id.to_string(), Arc::new(Mutex::new(record)));
    }

    pub fn delete(&self, fs_path: &str) -> bool {
        self.delete_by_module_id(&self.normalize_path(fs_path))
    }

    pub fn delete_by_module_id(&self, module_id: &str) -> bool {
        self.records.lock().remove(module_id).is_some()
    }

    /// Record that `importer` imports `dep`, on both records at once.
    pub fn link(&self, importer: &str, dep: &str) {
        let importer = self.normalize_path(importer);
        let dep = self.normalize_path(dep);

        let mut records = self.records.lock();
        let importer_record = records.entry(importer.clone()).or_default().clone();
        let dep_record = records.entry(dep.clone()).or_default().clone();

        if Arc::ptr_eq(&importer_record, &dep_record) {
            let mut record = importer_record.lock();
            record.imports.insert(dep);
            record.importers.insert(importer);
            return;
        }
        importer_record.lock().imports.insert(dep);
        dep_record.lock().importers.insert(importer);
    }

    /// Forward edges of a module, sorted.
    pub fn imports_of(&self, module_id: &str) -> Vec<String> {
        let record = self.records.lock().get(module_id).cloned();
        let mut imports: Vec<String> = record
            .map(|r| r.lock().imports.iter().cloned().collect())
            .unwrap_or_default();
        imports.sort();
        imports
    }

    /// Back edges of a module, sorted.
    pub fn importers_of(&self, module_id: &str) -> Vec<String> {
        let record = self.records.lock().get(module_id).cloned();
        let mut importers: Vec<String> = record
            .map(|r| r.lock().importers.iter().cloned().collect())
            .unwrap_or_default();
        importers.sort();
        importers
    }

    /// Reset a record's execution state in place.
    pub fn invalidate_module(&self, fs_path: &str) -> bool {
        match self.peek(fs_path) {
            Some(record) => {
                record.lock().invalidate();
                true
            }
            None => false,
        }
    }

    /// Remove the given modules and everything that (transitively) imports them.
    pub fn invalidate_dep_tree<I, S>(&self, ids: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut invalidated = HashSet::new();
        let mut pending: Vec<String> = ids
            .into_iter()
            .map(|id| self.normalize_path(id.as_ref()))
            .collect();

        let mut records = self.records.lock();
        while let Some(id) = pending.pop() {
            if !invalidated.insert(id.clone()) {
                continue;
            }
            if let Some(record) = records.remove(&id) {
                let record = record.lock();
                pending.extend(record.importers.iter().map(|i| normalize_module_id(i)));
            }
        }

        debug!(target: "nodule::cache", count = invalidated.len(), "invalidated dependents");
        invalidated
    }

    /// Remove the given modules and everything they (transitively) import.
    pub fn invalidate_sub_dep_tree<I, S>(&self, ids: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut invalidated = HashSet::new();
        let mut pending: Vec<String> = ids
            .into_iter()
            .map(|id| self.normalize_path(id.as_ref()))
            .collect();

        let mut records = self.records.lock();
        while let Some(id) = pending.pop() {
            if !invalidated.insert(id.clone()) {
                continue;
            }
            let sub_ids: Vec<String> = records
                .iter()
                .filter(|(_, record)| record.lock().importers.contains(&id))
                .map(|(key, _)| key.clone())
                .collect();
            pending.extend(sub_ids);
            records.remove(&id);
        }

        debug!(target: "nodule::cache", count = invalidated.len(), "invalidated dependencies");
        invalidated
    }

    /// Source map of a module, extracted from its inline map on first use.
    pub fn get_source_map(&self, fs_path: &str) -> Option<SourceMap> {
        let record = self.get(fs_path);
        let mut record = record.lock();
        if let Some(map) = &record.map {
            return Some(map.clone());
        }
        let map = record.code.as_deref().and_then(extract_source_map)?;
        record.map = Some(map.clone());
        Some(map)
    }

    /// Whether resolution of `specifier` is in progress.
    pub fn is_resolving(&self, specifier: &str) -> bool {
        let key = format!("{RESOLVE_SENTINEL_PREFIX}{specifier}");
        let record = self.records.lock().get(&key).cloned();
        record.is_some_and(|r| r.lock().resolving)
    }

    /// Specifiers whose resolution is in progress.
    pub fn pending_resolutions(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .records
            .lock()
            .keys()
            .filter_map(|key| key.strip_prefix(RESOLVE_SENTINEL_PREFIX))
            .map(str::to_string)
            .collect();
        pending.sort();
        pending
    }

    /// All module ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

//! Registry of platform builtin modules.
//!
//! The runner has no Node.js underneath it, so `node:fs` and friends are
//! whatever the embedder registers here. Lookups accept both `fs` and
//! `node:fs`.

use std::sync::Arc;

use dashmap::DashMap;
use nodule_runtime::{Value, normalize_node_builtin};

/// Builtin modules available to externalized and transformed code.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    modules: Arc<DashMap<String, Value>>,
}

fn key(name: &str) -> String {
    normalize_node_builtin(name)
        .unwrap_or_else(|| name.strip_prefix("node:").unwrap_or(name))
        .to_string()
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the exports object of a builtin.
    pub fn register(&self, name: &str, exports: Value) {
        self.modules.insert(key(name), exports);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.modules.get(&key(name)).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&key(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

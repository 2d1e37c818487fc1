//! CommonJS / ES module interop.
//!
//! Two directions are covered here:
//! - inside a CommonJS-shaped module, [`CjsExports`] and [`CjsModule`] unify
//!   `module.exports = x` with `exports.default = x` and promote the keys of
//!   `x` to named exports on the same namespace;
//! - for dependents, [`interop_module`] builds the read-only view where
//!   `default` is the "real" default export and named reads fall back to it.

use std::fmt;
use std::sync::Arc;

use crate::error::{RuntimeError, RuntimeResult};
use crate::namespace::Namespace;
use crate::value::{Object, Value};

/// Whether dependents of `path` should see an interop view of `namespace`.
///
/// `.mjs` files are always real ES modules and are never wrapped.
pub fn should_interop(path: &str, namespace: &Value, interop_default: bool) -> bool {
    if !interop_default {
        return false;
    }
    !path.ends_with(".mjs") && namespace.has("default")
}

struct InteropParts {
    module: Value,
    default_export: Value,
}

/// Read-only view over an interop-wrapped module.
#[derive(Clone)]
pub struct InteropNamespace(Arc<InteropParts>);

impl InteropNamespace {
    pub fn new(module: Value, default_export: Value) -> Self {
        Self(Arc::new(InteropParts {
            module,
            default_export,
        }))
    }

    /// The object named reads go to first.
    pub fn module(&self) -> &Value {
        &self.0.module
    }

    pub fn default_export(&self) -> &Value {
        &self.0.default_export
    }

    pub fn get(&self, key: &str) -> Value {
        if key == "default" {
            return self.0.default_export.clone();
        }
        let named = self.0.module.get(key);
        if !named.is_nullish() {
            return named;
        }
        self.0.default_export.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        if key == "default" {
            return !self.0.default_export.is_undefined();
        }
        self.0.module.has(key)
            || (!self.0.default_export.is_nullish() && self.0.default_export.has(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.module.keys()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for InteropNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteropNamespace")
            .field("keys", &self.keys())
            .field("default", &self.0.default_export)
            .finish()
    }
}

/// Split a module into the object named reads go to and its default export.
///
/// A nested `__esModule` marker on the default export is unwrapped one level.
pub fn interop_module(module: &Value) -> RuntimeResult<InteropNamespace> {
    if let Value::Promise(_) = module {
        return Err(RuntimeError::Interop(
            "a pending promise cannot be used as a module namespace".to_string(),
        ));
    }

    if module.is_primitive() {
        return Ok(InteropNamespace::new(
            Value::object([("default", module.clone())]),
            module.clone(),
        ));
    }

    let mut target = module.clone();
    let mut default_export = if module.has("default") {
        module.get("default")
    } else {
        module.clone()
    };

    if !default_export.is_primitive() && default_export.has("__esModule") {
        target = default_export.clone();
        if default_export.has("default") {
            default_export = default_export.get("default");
        }
    }

    Ok(InteropNamespace::new(target, default_export))
}

/// The `exports` global of a CommonJS-shaped module.
///
/// Reads go straight to the module namespace. Writes implement the CommonJS
/// rules: named writes land on the default export object and are mirrored as
/// named exports.
#[derive(Clone)]
pub struct CjsExports {
    exports: Namespace,
    interop: bool,
}

impl CjsExports {
    /// `interop` is the answer of [`should_interop`] for this module's path.
    pub fn new(exports: Namespace, interop: bool) -> Self {
        Self { exports, interop }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.exports
    }

    pub fn get(&self, key: &str) -> Value {
        self.exports.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.exports.has(key)
    }

    pub fn set(&self, key: &str, value: Value) -> RuntimeResult<()> {
        let is_self = matches!(&value, Value::Namespace(ns) if ns.ptr_eq(&self.exports));
        if key == "default" && self.interop && !is_self {
            self.exports.export_all(&value);
            return self.exports.set("default", value);
        }

        if !self.exports.has("default") {
            self.exports.set("default", Value::Object(Object::new()))?;
        }

        // Named reads of a primitive default yield undefined, as in Node.
        let default = self.exports.get("default");
        if default.is_primitive() {
            return self.exports.define_export(key, || Value::Undefined);
        }

        default.set(key, value.clone())?;
        if key != "default" {
            self.exports.define_export(key, move || value.clone())?;
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        Value::Namespace(self.exports.clone())
    }
}

/// The `module` global of a CommonJS-shaped module.
#[derive(Clone)]
pub struct CjsModule {
    exports: CjsExports,
}

impl CjsModule {
    pub fn new(exports: CjsExports) -> Self {
        Self { exports }
    }

    /// `module.exports` read.
    pub fn exports(&self) -> &CjsExports {
        &self.exports
    }

    /// `module.exports = value`
    pub fn set_exports(&self, value: Value) -> RuntimeResult<()> {
        let ns = self.exports.namespace();
        ns.export_all(&value);
        ns.set("default", value)
    }
}

/// The value `require()` hands back for a module namespace: the CommonJS
/// `module.exports` when one was assigned, otherwise the namespace itself.
pub fn require_value(namespace: &Value) -> Value {
    match namespace {
        Value::Namespace(ns) if ns.has("default") => ns.get("default"),
        Value::Interop(view) => view.default_export().clone(),
        other => other.clone(),
    }
}

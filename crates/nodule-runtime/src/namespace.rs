//! Module namespace objects.
//!
//! A [`Namespace`] is the `exports` object handed to executed code. Bindings
//! are either plain values or live getters, mirroring how transformed ESM
//! defines `export const x` as a getter over the local binding.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;

/// Live binding accessor.
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Storage of a single export.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Getter(Getter),
}

/// A property descriptor.
#[derive(Clone)]
pub struct Property {
    pub binding: Binding,
    pub enumerable: bool,
    pub configurable: bool,
    pub writable: bool,
}

impl Property {
    /// Enumerable, configurable, writable data property.
    pub fn value(value: Value) -> Self {
        Self {
            binding: Binding::Value(value),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }

    /// Enumerable, configurable accessor with no setter.
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            binding: Binding::Getter(Arc::new(f)),
            enumerable: true,
            configurable: true,
            writable: false,
        }
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}

/// Exports object of a module.
#[derive(Clone, Default)]
pub struct Namespace {
    props: Arc<RwLock<IndexMap<String, Property>>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an export. Getters run outside the lock so they may read this
    /// namespace themselves.
    pub fn get(&self, key: &str) -> Value {
        let binding = {
            let props = self.props.read();
            match props.get(key) {
                Some(prop) => prop.binding.clone(),
                None => return Value::Undefined,
            }
        };
        match binding {
            Binding::Value(value) => value,
            Binding::Getter(getter) => getter(),
        }
    }

    /// Assignment (`exports.key = value`) with strict-mode semantics.
    pub fn set(&self, key: &str, value: Value) -> RuntimeResult<()> {
        let mut props = self.props.write();
        if let Some(prop) = props.get_mut(key) {
            if matches!(prop.binding, Binding::Getter(_)) {
                return Err(RuntimeError::type_error(format!(
                    "Cannot set property {key} of [object Module] which has only a getter"
                )));
            }
            if !prop.writable {
                return Err(RuntimeError::type_error(format!(
                    "Cannot assign to read only property '{key}' of object '[object Module]'"
                )));
            }
            prop.binding = Binding::Value(value);
            return Ok(());
        }
        props.insert(key.to_string(), Property::value(value));
        Ok(())
    }

    /// `Object.defineProperty`. Fails when the existing property is not configurable.
    pub fn define_property(&self, key: &str, property: Property) -> RuntimeResult<()> {
        let mut props = self.props.write();
        if let Some(existing) = props.get(key) {
            if !existing.configurable {
                return Err(RuntimeError::type_error(format!(
                    "Cannot redefine property: {key}"
                )));
            }
        }
        props.insert(key.to_string(), property);
        Ok(())
    }

    /// Define a live export binding.
    pub fn define_export<F>(&self, key: &str, getter: F) -> RuntimeResult<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.define_property(key, Property::getter(getter))
    }

    pub fn has(&self, key: &str) -> bool {
        self.props.read().contains_key(key)
    }

    /// Enumerable keys in definition order.
    pub fn keys(&self) -> Vec<String> {
        self.props
            .read()
            .iter()
            .filter(|(_, prop)| prop.enumerable)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// All keys, enumerable or not.
    pub fn own_keys(&self) -> Vec<String> {
        self.props.read().keys().cloned().collect()
    }

    /// Enumerable entries with getters evaluated.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// Remove a configurable property. Returns false if it could not be deleted.
    pub fn delete(&self, key: &str) -> bool {
        let mut props = self.props.write();
        match props.get(key) {
            Some(prop) if !prop.configurable => false,
            Some(_) => {
                props.shift_remove(key);
                true
            }
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.props, &other.props)
    }

    /// Re-export every enumerable key of `source` as a live binding (`export *`).
    ///
    /// `default` is never re-exported. Self references, primitives, arrays and
    /// promises are ignored, and keys that cannot be defined are skipped.
    pub fn export_all(&self, source: &Value) {
        match source {
            Value::Namespace(ns) if ns.ptr_eq(self) => return,
            Value::Array(_) | Value::Promise(_) => return,
            v if v.is_primitive() => return,
            _ => {}
        }

        for key in source.keys() {
            if key == "default" {
                continue;
            }
            let src = source.clone();
            let name = key.clone();
            if let Err(err) = self.define_export(&key, move || src.get(&name)) {
                tracing::trace!(
                    target: "nodule::interop",
                    key = %key,
                    error = %err,
                    "skipping re-export"
                );
            }
        }
    }

    /// Wrap an arbitrary value as a namespace whose keys are live views of
    /// the value's properties. With `with_default`, a `default` binding
    /// pointing at the value itself is added when the value has none.
    pub fn synthetic(source: &Value, with_default: bool) -> Self {
        let ns = Namespace::new();
        let keys = source.keys();
        for key in &keys {
            let src = source.clone();
            let name = key.clone();
            let _ = ns.define_export(key, move || src.get(&name));
        }
        if with_default && !keys.iter().any(|k| k == "default") {
            let _ = ns.define_property("default", Property::value(source.clone()));
        }
        ns
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("keys", &self.own_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Object, Promise};

    #[test]
    fn test_live_binding_reflects_later_writes() {
        let local = Object::new();
        local.set("count", Value::from(1));

        let ns = Namespace::new();
        let src = local.clone();
        ns.define_export("count", move || src.get("count").unwrap_or_default())
            .unwrap();
        assert_eq!(ns.get("count").as_number(), Some(1.0));

        local.set("count", Value::from(2));
        assert_eq!(ns.get("count").as_number(), Some(2.0));
    }

    #[test]
    fn test_assigning_getter_only_export_fails() {
        let ns = Namespace::new();
        ns.define_export("x", || Value::from(1)).unwrap();
        assert!(ns.set("x", Value::from(2)).is_err());

        ns.set("y", Value::from(3)).unwrap();
        ns.set("y", Value::from(4)).unwrap();
        assert_eq!(ns.get("y").as_number(), Some(4.0));
    }

    #[test]
    fn test_non_configurable_cannot_be_redefined() {
        let ns = Namespace::new();
        ns.define_property(
            "locked",
            Property::value(Value::from(1)).configurable(false),
        )
        .unwrap();
        assert!(ns.define_export("locked", || Value::Null).is_err());
        assert!(!ns.delete("locked"));
        assert_eq!(ns.get("locked").as_number(), Some(1.0));
    }

    #[test]
    fn test_export_all_skips_default_and_self() {
        let ns = Namespace::new();
        let source = Value::object([("default", Value::from(0)), ("a", Value::from(1))]);
        ns.export_all(&source);
        assert_eq!(ns.keys(), vec!["a"]);
        assert_eq!(ns.get("a").as_number(), Some(1.0));

        ns.export_all(&Value::Namespace(ns.clone()));
        assert_eq!(ns.keys(), vec!["a"]);
    }

    #[test]
    fn test_export_all_ignores_unsupported_sources() {
        let ns = Namespace::new();
        ns.export_all(&Value::from(42));
        ns.export_all(&Value::from("str"));
        ns.export_all(&Value::from(vec![Value::from(1)]));
        ns.export_all(&Value::Promise(Promise::resolved(Value::Null)));
        assert!(ns.is_empty());
    }

    #[test]
    fn test_export_all_tolerates_locked_keys() {
        let ns = Namespace::new();
        ns.define_property("a", Property::value(Value::from(1)).configurable(false))
            .unwrap();
        let source = Value::object([("a", Value::from(2)), ("b", Value::from(3))]);
        ns.export_all(&source);
        assert_eq!(ns.get("a").as_number(), Some(1.0));
        assert_eq!(ns.get("b").as_number(), Some(3.0));
    }

    #[test]
    fn test_synthetic_namespace_is_live() {
        let source = Object::new();
        source.set("sep", Value::from("/"));
        let ns = Namespace::synthetic(&Value::Object(source.clone()), true);
        assert_eq!(ns.get("sep").as_str(), Some("/"));
        assert!(ns.get("default").strict_equals(&Value::Object(source.clone())));

        source.set("sep", Value::from("\\"));
        assert_eq!(ns.get("sep").as_str(), Some("\\"));
    }
}

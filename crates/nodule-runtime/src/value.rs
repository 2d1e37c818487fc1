//! Dynamically-typed values exchanged between the runner and executed module code.
//!
//! Reference types (`Object`, `Array`, `Function`, `Promise`, namespaces) are
//! shared handles: cloning a [`Value`] clones the handle, not the contents, and
//! [`Value::strict_equals`] compares them by identity.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{RuntimeError, RuntimeResult};
use crate::interop::InteropNamespace;
use crate::namespace::Namespace;

/// Signature of a host-implemented function callable from module code.
pub type NativeFn = dyn Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync;

/// A value visible to executed module code.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Array),
    Object(Object),
    Function(Function),
    Promise(Promise),
    /// Exports object of an executed module
    Namespace(Namespace),
    /// Read-only interop view over a CommonJS-shaped module
    Interop(InteropNamespace),
}

/// Plain object with insertion-ordered keys.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<IndexMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self(Arc::new(RwLock::new(map)))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().shift_remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Largest valid array index, 2^32 - 2.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// Most `undefined` holes a single write may open past the end of an array.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

/// Dense array.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Write `value` at `index`, filling any gap with `undefined`.
    ///
    /// Indices above [`MAX_ARRAY_INDEX`], or more than [`MAX_ARRAY_GAP`]
    /// slots past the end, are ignored. Returns whether the write happened.
    pub fn set(&self, index: usize, value: Value) -> bool {
        if index > MAX_ARRAY_INDEX {
            return false;
        }
        let mut items = self.0.write();
        if index >= items.len() {
            let Some(len) = index.checked_add(1) else {
                return false;
            };
            if len - items.len() > MAX_ARRAY_GAP {
                return false;
            }
            items.resize(len, Value::Undefined);
        }
        items[index] = value;
        true
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Host function exposed to module code.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    call: Arc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            call: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        (self.call)(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

/// Shared future that settles to a value, observable by any number of awaiters.
pub type SharedResult = Shared<BoxFuture<'static, RuntimeResult<Value>>>;

/// Promise handed to or produced by module code.
#[derive(Clone)]
pub struct Promise(Arc<SharedResult>);

impl Promise {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = RuntimeResult<Value>> + Send + 'static,
    {
        Self(Arc::new(future.boxed().shared()))
    }

    pub fn resolved(value: Value) -> Self {
        Self::new(async move { Ok(value) })
    }

    pub fn rejected(err: RuntimeError) -> Self {
        Self::new(async move { Err(err) })
    }

    /// Outcome, if the promise has already settled.
    pub fn peek(&self) -> Option<RuntimeResult<Value>> {
        self.0.peek().cloned()
    }

    /// Wait for the promise to settle.
    pub async fn settled(&self) -> RuntimeResult<Value> {
        (*self.0).clone().await
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    /// Build a plain object value.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Object::from_entries(entries))
    }

    /// Build a native function value.
    pub fn function<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Value::Function(Function::new(name, f))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Values that carry no properties of their own.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null
            | Value::Array(_)
            | Value::Object(_)
            | Value::Promise(_)
            | Value::Namespace(_)
            | Value::Interop(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Value::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Property read. Missing keys and reads on primitives yield `undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.get(key).unwrap_or_default(),
            Value::Namespace(ns) => ns.get(key),
            Value::Interop(view) => view.get(key),
            Value::Array(a) => {
                if key == "length" {
                    return Value::Number(a.len() as f64);
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| a.get(i))
                    .unwrap_or_default()
            }
            Value::String(s) if key == "length" => {
                Value::Number(s.encode_utf16().count() as f64)
            }
            Value::Function(f) if key == "name" => Value::from(f.name()),
            _ => Value::Undefined,
        }
    }

    /// Property write. Writes on primitives are ignored.
    pub fn set(&self, key: &str, value: Value) -> RuntimeResult<()> {
        match self {
            Value::Object(o) => {
                o.set(key, value);
                Ok(())
            }
            Value::Namespace(ns) => ns.set(key, value),
            Value::Interop(_) => Err(RuntimeError::type_error(format!(
                "Cannot assign to read only property '{key}' of object '[object Module]'"
            ))),
            Value::Array(a) => {
                if let Ok(index) = key.parse::<usize>() {
                    if !a.set(index, value) {
                        tracing::trace!(
                            target: "nodule::interop",
                            key,
                            "array write out of range ignored"
                        );
                    }
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
                "Cannot set properties of {self} (setting '{key}')"
            ))),
            _ => Ok(()),
        }
    }

    /// The `in` operator.
    pub fn has(&self, key: &str) -> bool {
        match self {
            Value::Object(o) => o.has(key),
            Value::Namespace(ns) => ns.has(key),
            Value::Interop(view) => view.has(key),
            Value::Array(a) => {
                key == "length" || key.parse::<usize>().is_ok_and(|i| i < a.len())
            }
            Value::Function(_) => key == "name",
            _ => false,
        }
    }

    /// Own enumerable keys, in definition order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(o) => o.keys(),
            Value::Namespace(ns) => ns.keys(),
            Value::Interop(view) => view.keys(),
            Value::Array(a) => (0..a.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Invoke a function value.
    pub fn call(&self, args: &[Value]) -> RuntimeResult<Value> {
        match self {
            Value::Function(f) => f.call(args),
            other => Err(RuntimeError::type_error(format!(
                "{} is not a function",
                other.type_of()
            ))),
        }
    }

    /// `===` semantics: primitives by value, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
            (Value::Interop(a), Value::Interop(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => {
                let parts: Vec<String> = a
                    .to_vec()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect();
                f.write_str(&parts.join(","))
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(func) => write!(f, "function {}() {{ [native code] }}", func.name()),
            Value::Promise(_) => f.write_str("[object Promise]"),
            Value::Namespace(_) | Value::Interop(_) => f.write_str("[object Module]"),
        }
    }
}

// Shallow on purpose: objects may reference themselves.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => write!(f, "Array(len={})", a.len()),
            Value::Object(o) => f.debug_tuple("Object").field(&o.keys()).finish(),
            Value::Function(func) => write!(f, "Function({})", func.name()),
            Value::Namespace(ns) => fmt::Debug::fmt(ns, f),
            Value::Interop(view) => f.debug_tuple("Interop").field(&view.keys()).finish(),
            other => write!(f, "{other}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Namespace(ns)
    }
}

impl From<InteropNamespace> for Value {
    fn from(view: InteropNamespace) -> Self {
        Value::Interop(view)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::from(items.into_iter().map(Value::from).collect::<Vec<_>>())
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

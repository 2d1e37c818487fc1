//! nodule-runtime - values, namespaces and module interop for the nodule runner.
//!
//! This crate holds everything the module runner shares with executed code:
//! the dynamically-typed [`Value`] model, module [`Namespace`] objects with
//! live bindings, and the CommonJS/ESM interop rules.
//!
//! # Features
//!
//! - **Live bindings**: exports are getters over the module's own state
//! - **CommonJS interop**: `module.exports =` and `exports.default =` are the same write
//! - **Interop views**: CommonJS defaults are importable both as `default` and by name
//! - **Identifiers**: request/module id normalization shared with the dev server
//!
//! # Example
//!
//! ```
//! use nodule_runtime::{CjsExports, CjsModule, Namespace, Value};
//!
//! let exports = Namespace::new();
//! let module = CjsModule::new(CjsExports::new(exports.clone(), true));
//! module
//!     .set_exports(Value::object([("a", Value::from(1))]))
//!     .unwrap();
//!
//! assert_eq!(exports.get("a").as_number(), Some(1.0));
//! assert_eq!(exports.get("default").get("a").as_number(), Some(1.0));
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod interop;
pub mod modules;
pub mod namespace;
pub mod node_builtins;
pub mod source_map;
pub mod value;

pub use config::RunnerConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use interop::{
    CjsExports, CjsModule, InteropNamespace, interop_module, require_value, should_interop,
};
pub use modules::{ModuleFormat, has_esm_syntax, strip_shebang};
pub use namespace::{Binding, Getter, Namespace, Property};
pub use node_builtins::{is_node_builtin, normalize_node_builtin};
pub use source_map::{SourceMap, extract_source_map};
pub use value::{Array, Function, MAX_ARRAY_GAP, MAX_ARRAY_INDEX, Object, Promise, Value};

/// Common imports for evaluators and hosts.
pub mod prelude {
    pub use crate::config::RunnerConfig;
    pub use crate::error::{RuntimeError, RuntimeResult};
    pub use crate::interop::{CjsExports, CjsModule, InteropNamespace};
    pub use crate::modules::ModuleFormat;
    pub use crate::namespace::{Namespace, Property};
    pub use crate::value::{Array, Function, Object, Promise, Value};
}

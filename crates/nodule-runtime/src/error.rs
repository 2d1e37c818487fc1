//! Error types for nodule-runtime

use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Runtime error type.
///
/// Errors are `Clone` because a single in-flight module execution is shared
/// between every concurrent importer, and each of them receives the same
/// failure.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The host could not resolve a specifier
    #[error("Cannot find module '{specifier}'{}", imported_from(.importer))]
    ModuleNotFound {
        specifier: String,
        importer: Option<String>,
    },

    /// The host returned neither code nor an externalize hint
    #[error("[nodule] Failed to load \"{id}\"{}", imported_from(.importer))]
    FetchFailed { id: String, importer: Option<String> },

    /// A value thrown by executed module code
    #[error("Uncaught {0}")]
    Thrown(Value),

    /// Module code failed for a reason reported by the evaluator
    #[error("Error executing {id}: {message}")]
    Execution { id: String, message: String },

    /// Illegal operation on a value (assigning a getter-only export, etc.)
    #[error("TypeError: {0}")]
    Type(String),

    /// A module shape that cannot be interop-wrapped
    #[error("Interop error: {0}")]
    Interop(String),

    /// A builtin module that is not registered with the runner
    #[error("No such built-in module: {0}")]
    UnknownBuiltin(String),

    /// Invalid runner configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Failure reported by the host collaborator
    #[error("Host error: {0}")]
    Host(Arc<anyhow::Error>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn imported_from(importer: &Option<String>) -> String {
    match importer {
        Some(importer) => format!(" imported from '{importer}'"),
        None => String::new(),
    }
}

impl RuntimeError {
    /// Create a module-not-found error
    pub fn not_found(specifier: impl Into<String>, importer: Option<&str>) -> Self {
        Self::ModuleNotFound {
            specifier: specifier.into(),
            importer: importer.map(str::to_string),
        }
    }

    /// Create a fetch failure error
    pub fn fetch_failed(id: impl Into<String>, importer: Option<&str>) -> Self {
        Self::FetchFailed {
            id: id.into(),
            importer: importer.map(str::to_string),
        }
    }

    /// Wrap a value thrown by module code
    pub fn thrown(value: impl Into<Value>) -> Self {
        Self::Thrown(value.into())
    }

    /// Create an execution error
    pub fn execution(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Node-style error code, when one applies.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::ModuleNotFound { .. } => Some("ERR_MODULE_NOT_FOUND"),
            Self::UnknownBuiltin(_) => Some("ERR_UNKNOWN_BUILTIN_MODULE"),
            Self::Type(_) => Some("ERR_INVALID_ARG_TYPE"),
            _ => None,
        }
    }

    /// Whether this error originated from module code rather than the loader.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Thrown(_) | Self::Execution { .. } | Self::Type(_))
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<anyhow::Error> for RuntimeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Host(Arc::new(err))
    }
}

/// Result type using RuntimeError
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_importer() {
        let err = RuntimeError::not_found("lodash", Some("/src/a.js"));
        assert_eq!(
            err.to_string(),
            "Cannot find module 'lodash' imported from '/src/a.js'"
        );
        assert_eq!(err.code(), Some("ERR_MODULE_NOT_FOUND"));

        let err = RuntimeError::not_found("lodash", None);
        assert_eq!(err.to_string(), "Cannot find module 'lodash'");
    }

    #[test]
    fn test_fetch_failed_message() {
        let err = RuntimeError::fetch_failed("/src/a.js", Some("/src/main.js"));
        assert_eq!(
            err.to_string(),
            "[nodule] Failed to load \"/src/a.js\" imported from '/src/main.js'"
        );
        assert!(!err.is_execution_error());
    }

    #[test]
    fn test_host_errors_convert() {
        let err: RuntimeError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, RuntimeError::Host(_)));
        assert!(err.to_string().contains("connection reset"));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RuntimeError = io.into();
        assert!(matches!(err, RuntimeError::Io(_)));
    }

    #[test]
    fn test_thrown_displays_value() {
        let err = RuntimeError::thrown("boom");
        assert_eq!(err.to_string(), "Uncaught boom");
        assert!(err.is_execution_error());
    }
}

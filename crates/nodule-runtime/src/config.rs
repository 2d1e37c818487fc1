//! Configuration for the module runner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Environment variable that turns on runner diagnostics.
pub const DEBUG_ENV_VAR: &str = "NODULE_DEBUG_RUNNER";

/// Module runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Project root; root-relative ids (`/src/a.js`) are looked up under it.
    /// Default: current directory
    pub root: PathBuf,

    /// Public base path stripped from request ids.
    pub base: Option<String>,

    /// Expose CommonJS defaults as interop namespaces.
    /// Default: true
    pub interop_default: bool,

    /// Emit diagnostics for slow modules.
    /// Default: false; [`RunnerConfig::from_env`] turns it on when `NODULE_DEBUG_RUNNER` is set
    pub debug: bool,

    /// Delay before a slow module is reported.
    /// Default: 2000
    pub stale_warning_ms: u64,

    /// Fail when the host cannot resolve a specifier instead of using it verbatim.
    /// Default: false
    pub strict_resolution: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_default(),
            base: None,
            interop_default: true,
            debug: false,
            stale_warning_ms: 2000,
            strict_resolution: false,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `debug` taken from the environment.
    pub fn from_env() -> Self {
        Self {
            debug: std::env::var_os(DEBUG_ENV_VAR).is_some_and(|v| !v.is_empty()),
            ..Default::default()
        }
    }

    /// Parse a JSON configuration document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> RuntimeResult<Self> {
        serde_json::from_str(json).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn interop_default(mut self, enabled: bool) -> Self {
        self.interop_default = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn stale_warning_ms(mut self, ms: u64) -> Self {
        self.stale_warning_ms = ms;
        self
    }

    pub fn strict_resolution(mut self, enabled: bool) -> Self {
        self.strict_resolution = enabled;
        self
    }

    pub fn stale_warning(&self) -> Duration {
        Duration::from_millis(self.stale_warning_ms)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }
}

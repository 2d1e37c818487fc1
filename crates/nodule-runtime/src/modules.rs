//! Module format detection helpers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Module format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// ES Modules (import/export)
    #[default]
    ESM,
    /// CommonJS (require/module.exports)
    CommonJS,
    /// Platform builtin (`node:fs`, ...)
    Builtin,
}

impl ModuleFormat {
    /// Detect format from file extension alone.
    pub fn from_extension(ext: Option<&str>) -> Option<Self> {
        match ext {
            Some("cjs" | "cts") => Some(ModuleFormat::CommonJS),
            Some("mjs" | "mts") => Some(ModuleFormat::ESM),
            _ => None,
        }
    }

    /// Detect format from extension, falling back to a syntax sniff.
    pub fn detect(path: &str, source: &str) -> Self {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext);
        Self::from_extension(ext).unwrap_or(if has_esm_syntax(source) {
            ModuleFormat::ESM
        } else {
            ModuleFormat::CommonJS
        })
    }

    pub fn is_commonjs(&self) -> bool {
        matches!(self, ModuleFormat::CommonJS)
    }

    pub fn is_esm(&self) -> bool {
        matches!(self, ModuleFormat::ESM)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleFormat::ESM => "esm",
            ModuleFormat::CommonJS => "cjs",
            ModuleFormat::Builtin => "builtin",
        }
    }
}

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("valid regex"));

static ESM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?m)(?:[\s;]|^)(?:import[\s\w*,{}]*from|import\s*["'*{]|"#,
        r"export\b\s*(?:[*{]|default|class|type|function|const|var|let|async function)|",
        r"import\.meta\b)",
    ))
    .expect("valid regex")
});

/// Heuristic check for ES module syntax, ignoring comments.
pub fn has_esm_syntax(code: &str) -> bool {
    let stripped = COMMENT_RE.replace_all(code, "");
    ESM_RE.is_match(&stripped)
}

/// Blank out a leading shebang line.
///
/// The line is replaced with spaces so line and column positions survive.
pub fn strip_shebang(source: &str) -> String {
    if source.starts_with("#!") {
        let end = source.find('\n').unwrap_or(source.len());
        format!("{}{}", " ".repeat(end), &source[end..])
    } else {
        source.to_string()
    }
}

//! Inline source map extraction.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::{Deserialize, Serialize};

static INLINE_MAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//# sourceMappingURL=data:application/json;charset=utf-8;base64,([A-Za-z0-9+/=]+)")
        .expect("valid regex")
});

/// Decoded source map (v3).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

/// Parse the last inline base64 source map appended to `code`.
///
/// Malformed maps are ignored.
pub fn extract_source_map(code: &str) -> Option<SourceMap> {
    let encoded = INLINE_MAP_RE
        .captures_iter(code)
        .last()?
        .get(1)?
        .as_str();
    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(
                target: "nodule::source_map",
                error = %err,
                "invalid base64 source map"
            );
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(map) => Some(map),
        Err(err) => {
            tracing::debug!(target: "nodule::source_map", error = %err, "invalid source map json");
            None
        }
    }
}

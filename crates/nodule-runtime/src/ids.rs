//! Module identifier normalization.
//!
//! Request ids come from the dev-server side (`/@fs/...`, `/@id/...`, with
//! cache-busting queries); module ids are the stable keys of the module cache.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::node_builtins::PREFIXED_BUILTINS;

/// Prefix of ids that are not valid file paths.
pub const VALID_ID_PREFIX: &str = "/@id/";

/// Placeholder the dev server uses for the leading NUL byte of virtual ids.
pub const NULL_BYTE_PLACEHOLDER: &str = "__x00__";

const INTERNAL_REQUESTS: &[&str] = &["@vite/client", "@vite/env"];

static QUERY_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\?v=\w+", "?"),
        (r"&v=\w+", ""),
        (r"\?t=\w+", "?"),
        (r"&t=\w+", ""),
        (r"\?import", "?"),
        (r"&import", ""),
        (r"\?&", "?"),
        (r"\?+$", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

/// Convert backslashes to forward slashes.
pub fn slash(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Drop the `?query` and `#hash` parts.
pub fn clean_url(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(end) => &url[..end],
        None => url,
    }
}

/// Dev-server internals that are never resolved or fetched.
pub fn is_internal_request(id: &str) -> bool {
    let id = id.strip_prefix('/').unwrap_or(id);
    INTERNAL_REQUESTS.contains(&id)
}

fn collapse_leading_slashes(id: &str) -> String {
    let trimmed = id.trim_start_matches('/');
    if trimmed.len() == id.len() {
        id.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Normalize an id as requested by executed code or returned by the host.
pub fn normalize_request_id(id: &str, base: Option<&str>) -> String {
    let mut id = id.to_string();

    if let Some(base) = base {
        if id.starts_with(&with_trailing_slash(base)) {
            id = format!("/{}", &id[base.len()..]);
        }
    }

    let virtual_prefix = format!("{VALID_ID_PREFIX}{NULL_BYTE_PLACEHOLDER}");
    if let Some(rest) = id.strip_prefix(&virtual_prefix) {
        id = format!("\0{rest}");
    }
    for prefix in [VALID_ID_PREFIX, "__vite-browser-external:", "file:"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest.to_string();
        }
    }
    id = collapse_leading_slashes(&id);

    for (re, replacement) in QUERY_RULES.iter() {
        id = re.replace(&id, *replacement).into_owned();
    }
    id
}

/// Normalize a filesystem path or module id into a module cache key.
pub fn normalize_module_id(id: &str) -> String {
    if PREFIXED_BUILTINS.contains(&id) {
        return id.to_string();
    }

    let mut id = slash(id);
    if let Some(rest) = id.strip_prefix("/@fs/") {
        id = format!("/{rest}");
    }
    if let Some(rest) = id.strip_prefix("file:/") {
        id = format!("/{rest}");
    }
    if let Some(rest) = id.strip_prefix("node:") {
        id = rest.to_string();
    }
    collapse_leading_slashes(&id)
}

/// Result of mapping an id onto the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePath {
    pub path: String,
    pub exists: bool,
}

/// Map a request id onto a filesystem path relative to `root`.
///
/// `/@fs/` ids are trusted to exist. Root-relative ids (`/src/a.js`) are
/// checked under `root`; ids already under `root` are checked as-is.
pub fn to_file_path(id: &str, root: &Path) -> FilePath {
    let root_prefix = with_trailing_slash(&slash(&root.to_string_lossy()));

    let (mut path, exists) = if id.starts_with("/@fs/") {
        (id[4..].to_string(), true)
    } else if !id.starts_with(&root_prefix) && id.starts_with('/') {
        let resolved = slash(&root.join(&id[1..]).to_string_lossy());
        if Path::new(clean_url(&resolved)).exists() {
            (resolved, true)
        } else {
            (id.to_string(), false)
        }
    } else if id.starts_with(&root_prefix) && Path::new(clean_url(id)).exists() {
        (id.to_string(), true)
    } else {
        (id.to_string(), false)
    };

    if path.starts_with("//") {
        path.remove(0);
    }
    FilePath { path, exists }
}

/// `file://` URL for a module path; relative and virtual ids are placed under `root`.
pub fn file_url(path: &str, root: &Path) -> String {
    let candidate = Path::new(path);
    let absolute: PathBuf = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", slash(&absolute.to_string_lossy())))
}

/// Filesystem path of a `file:` URL, or the input itself when it is a plain path.
pub fn file_url_to_path(identifier: &str) -> PathBuf {
    if identifier.starts_with("file:") {
        if let Some(path) = Url::parse(identifier)
            .ok()
            .and_then(|url| url.to_file_path().ok())
        {
            return path;
        }
        return PathBuf::from(identifier.trim_start_matches("file://"));
    }
    PathBuf::from(identifier)
}

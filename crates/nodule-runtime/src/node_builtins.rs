//! Node.js built-in module detection

/// Built-ins that only exist with the `node:` prefix
pub const PREFIXED_BUILTINS: &[&str] =
    &["node:sea", "node:sqlite", "node:test", "node:test/reporters"];

/// Known Node.js built-in modules
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Builtin name without the `node:` prefix, if `specifier` names a builtin.
///
/// - `node:fs` -> Some("fs")
/// - `fs/promises` -> Some("fs/promises")
/// - `node:test` -> Some("node:test") (prefix-only builtin)
/// - `lodash` -> None
pub fn normalize_node_builtin(specifier: &str) -> Option<&str> {
    if PREFIXED_BUILTINS.contains(&specifier) {
        return Some(specifier);
    }

    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    let base = name.split('/').next()?;
    if NODE_BUILTINS.contains(&base) {
        Some(name)
    } else {
        None
    }
}

/// Whether `id` names a platform builtin (with or without `node:`).
pub fn is_node_builtin(id: &str) -> bool {
    normalize_node_builtin(id).is_some()
}

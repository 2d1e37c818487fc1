//! Circular import detection.
//!
//! Depth-first search over the recorded `imports` edges of the module store,
//! with an explicit visiting/done mark per node.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::store::ModuleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Find an import chain from `start` that leads back to `start` or to a
/// module currently on `callstack`.
///
/// Returns the chain, beginning with `start` and ending with the module that
/// closes the cycle.
pub fn find_cycle(store: &ModuleStore, start: &str, callstack: &[String]) -> Option<Vec<String>> {
    let on_stack: HashSet<&str> = callstack.iter().map(String::as_str).collect();
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut path = vec![start.to_string()];
    let mut frames: Vec<(String, Vec<String>)> = vec![(start.to_string(), store.imports_of(start))];
    marks.insert(start.to_string(), Mark::Visiting);

    loop {
        let Some(frame) = frames.last_mut() else {
            return None;
        };

        let Some(next) = frame.1.pop() else {
            if let Some((node, _)) = frames.pop() {
                marks.insert(node, Mark::Done);
                path.pop();
            }
            continue;
        };

        if next == start || on_stack.contains(next.as_str()) {
            path.push(next);
            return Some(path);
        }

        match marks.get(&next) {
            Some(Mark::Visiting) => {
                trace!(target: "nodule::graph", module = %next, "cycle not involving the request");
            }
            Some(Mark::Done) => {}
            None => {
                marks.insert(next.clone(), Mark::Visiting);
                let imports = store.imports_of(&next);
                path.push(next.clone());
                frames.push((next, imports));
            }
        }
    }
}

/// Whether `start` participates in a cycle with itself or the call stack.
pub fn is_circular(store: &ModuleStore, start: &str, callstack: &[String]) -> bool {
    callstack.iter().any(|id| id == start) || find_cycle(store, start, callstack).is_some()
}

//! In-memory modules substituted for well-known dev-client requests.

use std::collections::HashMap;

use nodule_runtime::Value;

fn noop(name: &str) -> Value {
    Value::function(name, |_| Ok(Value::Undefined))
}

fn hot_context_stub() -> Value {
    Value::object(
        ["accept", "prune", "dispose", "decline", "invalidate", "on", "send"]
            .into_iter()
            .map(|name| (name, noop(name))),
    )
}

/// The dev client as seen by server-side code: nothing to inject, nothing to style.
pub fn client_stub() -> Value {
    Value::object([
        (
            "injectQuery",
            Value::function("injectQuery", |args| {
                Ok(args.first().cloned().unwrap_or_default())
            }),
        ),
        (
            "createHotContext",
            Value::function("createHotContext", |_| Ok(hot_context_stub())),
        ),
        ("updateStyle", noop("updateStyle")),
        ("removeStyle", noop("removeStyle")),
    ])
}

/// Stubs every runner starts with, keyed by request id.
pub fn default_request_stubs() -> HashMap<String, Value> {
    let client = client_stub();
    HashMap::from([
        ("/@vite/client".to_string(), client.clone()),
        ("@vite/client".to_string(), client),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_query_is_identity() {
        let client = client_stub();
        let url = client
            .get("injectQuery")
            .call(&[Value::from("/src/a.css"), Value::from("import")])
            .unwrap();
        assert_eq!(url.as_str(), Some("/src/a.css"));
    }

    #[test]
    fn test_hot_context_methods_are_callable() {
        let hot = client_stub().get("createHotContext").call(&[]).unwrap();
        for name in ["accept", "dispose", "invalidate", "on", "send"] {
            assert!(hot.get(name).call(&[]).unwrap().is_undefined(), "{name}");
        }
    }

    #[test]
    fn test_both_client_ids_share_one_object() {
        let stubs = default_request_stubs();
        assert!(stubs["/@vite/client"].strict_equals(&stubs["@vite/client"]));
    }
}

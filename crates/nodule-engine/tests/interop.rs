mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use futures_util::FutureExt;
use nodule_runtime::Value;
use parking_lot::Mutex;
use tempfile::tempdir;

type Slot = Arc<Mutex<Value>>;

/// A main module that imports `dep` and keeps what it got.
fn import_into(fx: &Fixture, dep: &'static str) -> Slot {
    let slot: Slot = Arc::default();
    let sink = slot.clone();
    fx.module("/src/main.js", move |ctx| {
        let sink = sink.clone();
        async move {
            *sink.lock() = ctx.import(dep).await?;
            Ok(())
        }
        .boxed()
    });
    slot
}

#[tokio::test]
async fn test_module_exports_assignment_is_visible_by_name_and_default() {
    let fx = Fixture::new();
    fx.module("/src/legacy.js", |ctx| {
        async move {
            let module = ctx.module().expect("transformed modules get CommonJS globals");
            module.set_exports(Value::object([("a", Value::from(1)), ("b", Value::from(2))]))
        }
        .boxed()
    });
    let seen = import_into(&fx, "/src/legacy.js");

    fx.runner().execute_id("/src/main.js").await.unwrap();
    let legacy = seen.lock().clone();
    assert_eq!(legacy.get("a").as_number(), Some(1.0));
    assert_eq!(legacy.get("b").as_number(), Some(2.0));
    assert_eq!(legacy.get("default").get("a").as_number(), Some(1.0));
}

#[tokio::test]
async fn test_exports_writes_land_on_default() {
    let fx = Fixture::new();
    fx.module("/src/named.js", |ctx| {
        async move {
            let exports = ctx.cjs_exports().expect("exports global");
            exports.set("answer", Value::from(42))
        }
        .boxed()
    });
    let seen = import_into(&fx, "/src/named.js");

    fx.runner().execute_id("/src/main.js").await.unwrap();
    let named = seen.lock().clone();
    assert_eq!(named.get("answer").as_number(), Some(42.0));
    assert_eq!(named.get("default").get("answer").as_number(), Some(42.0));
}

#[tokio::test]
async fn test_export_star_skips_default_and_self() {
    let fx = Fixture::new();
    fx.module("/src/dep.js", |ctx| {
        async move {
            ctx.define_export("default", || Value::from("dep default"))?;
            ctx.define_export("helper", || Value::from("helper"))
        }
        .boxed()
    });
    fx.module("/src/barrel.js", |ctx| {
        async move {
            let dep = ctx.import("/src/dep.js").await?;
            ctx.export_all(&dep);
            ctx.export_all(&Value::Namespace(ctx.exports().clone()));
            Ok(())
        }
        .boxed()
    });

    let barrel = fx.runner().execute_id("/src/barrel.js").await.unwrap();
    assert_eq!(barrel.get("helper").as_str(), Some("helper"));
    assert!(!barrel.has("default"));
    assert_eq!(barrel.keys(), vec!["helper"]);
}

#[tokio::test]
async fn test_externalized_builtin_is_interop_wrapped() {
    let fx = Fixture::new();
    let seen = import_into(&fx, "node:path");
    let path_module = Value::object([("sep", Value::from("/"))]);
    let runner = fx.builder().builtin("node:path", path_module.clone()).build();

    runner.execute_id("/src/main.js").await.unwrap();
    let imported = seen.lock().clone();
    assert!(matches!(imported, Value::Interop(_)));
    assert_eq!(imported.get("sep").as_str(), Some("/"));
    assert!(imported.get("default").strict_equals(&path_module));
    assert_eq!(fx.host.fetch_count("node:path"), 1);
}

#[tokio::test]
async fn test_unknown_builtin_is_an_error() {
    let fx = Fixture::new();
    import_into(&fx, "node:crypto");

    let err = fx.runner().execute_id("/src/main.js").await.unwrap_err();
    assert!(err.to_string().contains("crypto"), "{err}");
}

#[tokio::test]
async fn test_externalized_commonjs_file_is_loaded_natively() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("dep.cjs");
    std::fs::write(&file, "// native dep").unwrap();
    let file = file.to_string_lossy().replace('\\', "/");

    let fx = Fixture::new();
    fx.host.externalize("/src/dep.js", &file);
    fx.evaluator.script("// native dep", |ctx| {
        async move {
            let module = ctx.module().expect("CommonJS externals get a module global");
            module.set_exports(Value::object([("answer", Value::from(42))]))
        }
        .boxed()
    });
    let seen = import_into(&fx, "/src/dep.js");
    let runner = fx.runner();

    runner.execute_id("/src/main.js").await.unwrap();
    let dep = seen.lock().clone();
    assert_eq!(dep.get("answer").as_number(), Some(42.0));
    assert_eq!(dep.get("default").get("answer").as_number(), Some(42.0));
    assert!(runner.external_cache().contains(&file));

    // evicting the importer does not reload the external
    runner.module_cache().invalidate_dep_tree(["/src/dep.js"]);
    runner.execute_id("/src/main.js").await.unwrap();
    assert_eq!(fx.runs("/src/main.js"), 2);
    assert_eq!(fx.evaluator.runs("// native dep"), 1);
}

#[tokio::test]
async fn test_require_of_builtin_returns_it_raw() {
    let fx = Fixture::new();
    let os = Value::object([("platform", Value::from("linux"))]);
    let seen: Slot = Arc::default();
    let sink = seen.clone();
    fx.module("/src/cli.js", move |ctx| {
        let sink = sink.clone();
        async move {
            *sink.lock() = ctx.require("node:os").await?;
            Ok(())
        }
        .boxed()
    });
    let runner = fx.builder().builtin("os", os.clone()).build();

    runner.execute_id("/src/cli.js").await.unwrap();
    assert!(seen.lock().strict_equals(&os));
    assert_eq!(fx.host.fetch_count("node:os"), 0);
}

#[tokio::test]
async fn test_interop_can_be_disabled() {
    let fx = Fixture::new();
    let seen = import_into(&fx, "node:path");
    let runner = fx
        .builder()
        .config(Fixture::config().interop_default(false))
        .builtin("path", Value::object([("sep", Value::from("/"))]))
        .build();

    runner.execute_id("/src/main.js").await.unwrap();
    let imported = seen.lock().clone();
    assert!(matches!(imported, Value::Namespace(_)));
    assert_eq!(imported.get("sep").as_str(), Some("/"));
    assert!(!runner.should_interop("/node_modules/pkg/index.js", &imported));
}

#[tokio::test]
async fn test_cyclic_externals_from_concurrent_imports() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for (file, marker) in [("a.mjs", "// native a"), ("b.mjs", "// native b")] {
        let path = dir.path().join(file);
        std::fs::write(&path, marker).unwrap();
        paths.push(dunce::canonicalize(&path).unwrap().to_string_lossy().replace('\\', "/"));
    }

    let fx = Fixture::new();
    fx.host.externalize("/src/x.js", &paths[0]);
    fx.host.externalize("/src/y.js", &paths[1]);
    for (marker, name, peer) in [("// native a", "a", "./b.mjs"), ("// native b", "b", "./a.mjs")] {
        fx.evaluator.script(marker, move |ctx| {
            async move {
                ctx.define_export("name", move || Value::from(name))?;
                tokio::task::yield_now().await;
                let other = ctx.import(peer).await?;
                ctx.define_export("peer", move || other.get("name"))
            }
            .boxed()
        });
    }
    fx.module("/src/main.js", |ctx| {
        async move {
            let (x, y) = tokio::join!(ctx.import("/src/x.js"), ctx.import("/src/y.js"));
            let (x, y) = (x?, y?);
            ctx.define_export("x", move || x.get("peer"))?;
            ctx.define_export("y", move || y.get("peer"))
        }
        .boxed()
    });

    let main = tokio::time::timeout(Duration::from_secs(5), fx.runner().execute_id("/src/main.js"))
        .await
        .expect("cyclic externals must settle")
        .unwrap();
    assert_eq!(main.get("x").as_str(), Some("b"));
    assert_eq!(main.get("y").as_str(), Some("a"));
    assert_eq!(fx.evaluator.runs("// native a"), 1);
    assert_eq!(fx.evaluator.runs("// native b"), 1);
}

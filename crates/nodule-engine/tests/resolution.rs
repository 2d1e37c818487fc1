mod common;

use common::Fixture;
use futures_util::FutureExt;
use nodule_engine::RuntimeError;
use nodule_runtime::Value;
use tempfile::tempdir;

fn calls(fx: &Fixture) -> Vec<(String, Option<String>)> {
    fx.host.resolve_calls()
}

fn call(specifier: &str, importer: Option<&str>) -> (String, Option<String>) {
    (specifier.to_string(), importer.map(str::to_string))
}

#[tokio::test]
async fn test_same_specifier_resolves_per_importer() {
    let fx = Fixture::new();
    fx.host.alias("lodash", Some("/src/a.js"), "/deps/lodash-v3.js");
    fx.host.alias("lodash", Some("/src/b.js"), "/deps/lodash-v4.js");
    for (id, version) in [("/deps/lodash-v3.js", 3), ("/deps/lodash-v4.js", 4)] {
        fx.module(id, move |ctx| {
            async move { ctx.define_export("version", move || Value::from(version)) }.boxed()
        });
    }
    for id in ["/src/a.js", "/src/b.js"] {
        fx.module(id, |ctx| {
            async move {
                let lodash = ctx.import("lodash").await?;
                ctx.define_export("lodash", move || lodash.get("version"))
            }
            .boxed()
        });
    }
    let runner = fx.runner();

    let a = runner.execute_id("/src/a.js").await.unwrap();
    let b = runner.execute_id("/src/b.js").await.unwrap();
    assert_eq!(a.get("lodash").as_number(), Some(3.0));
    assert_eq!(b.get("lodash").as_number(), Some(4.0));

    let seen = calls(&fx);
    assert!(seen.contains(&call("lodash", Some("/src/a.js"))));
    assert!(seen.contains(&call("lodash", Some("/src/b.js"))));
    assert_eq!(runner.module_cache().imports_of("/src/a.js"), vec!["/deps/lodash-v3.js"]);
}

#[tokio::test]
async fn test_strict_resolution_reports_missing_module() {
    let fx = Fixture::new();
    fx.host.alias("/src/main.js", None, "/src/main.js");
    fx.module("/src/main.js", |ctx| {
        async move {
            ctx.import("missing-pkg").await?;
            Ok(())
        }
        .boxed()
    });
    let runner = fx.runner_with(Fixture::config().strict_resolution(true));

    let err = runner.execute_id("/src/main.js").await.unwrap_err();
    assert_eq!(err.code(), Some("ERR_MODULE_NOT_FOUND"));
    assert!(matches!(
        &err,
        RuntimeError::ModuleNotFound { specifier, .. } if specifier == "missing-pkg"
    ));
    assert!(err.to_string().contains("/src/main.js"), "{err}");
}

#[tokio::test]
async fn test_lenient_resolution_uses_specifier_verbatim() {
    let fx = Fixture::new();
    fx.leaf("virtual:config");
    let runner = fx.runner();

    runner.execute_id("virtual:config").await.unwrap();
    assert_eq!(calls(&fx), vec![call("virtual:config", None)]);
    assert!(runner.module_cache().contains("virtual:config"));
}

#[tokio::test]
async fn test_resolved_id_prefix_drops_importer() {
    let fx = Fixture::new();
    fx.leaf("virtual:thing");
    fx.module("/src/main.js", |ctx| {
        async move {
            ctx.import("/@id/virtual:thing").await?;
            Ok(())
        }
        .boxed()
    });

    fx.runner().execute_id("/src/main.js").await.unwrap();
    assert!(calls(&fx).contains(&call("/@id/virtual:thing", None)));
    assert_eq!(fx.runs("virtual:thing"), 1);
}

#[tokio::test]
async fn test_files_under_root_skip_the_host() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/util.js"), "export {}").unwrap();

    let fx = Fixture::new();
    fx.leaf("/src/util.js");
    let runner = fx.runner_with(Fixture::config().root(dir.path()));

    runner.execute_id("/src/util.js").await.unwrap();
    assert!(calls(&fx).is_empty());

    let on_disk = dir.path().join("src/util.js");
    assert!(runner.module_cache().contains(&on_disk.to_string_lossy()));
    assert_eq!(fx.host.fetch_count("/src/util.js"), 1);
}

#[tokio::test]
async fn test_execute_file_absolute_and_relative() {
    let dir = tempdir().unwrap();
    let entry = dir.path().join("entry.js");
    std::fs::write(&entry, "export {}").unwrap();
    let entry_id = entry.to_string_lossy().replace('\\', "/");

    let fx = Fixture::new();
    fx.module(&entry_id, |ctx| {
        async move { ctx.define_export("entry", || Value::from(true)) }.boxed()
    });
    let runner = fx.runner_with(Fixture::config().root(dir.path()));

    let absolute = runner.execute_file(&entry).await.unwrap();
    let relative = runner.execute_file("entry.js").await.unwrap();
    assert_eq!(absolute.get("entry").as_bool(), Some(true));
    assert!(relative.strict_equals(&absolute));
    assert_eq!(fx.runs(&entry_id), 1);
    assert!(calls(&fx).is_empty());
}

#[tokio::test]
async fn test_runners_can_share_a_module_cache() {
    let fx = Fixture::new();
    fx.module("/src/state.js", |ctx| {
        async move { ctx.define_export("count", || Value::from(1)) }.boxed()
    });
    let first = fx.runner();
    let second = fx.builder().module_cache(first.module_cache().clone()).build();

    let a = first.execute_id("/src/state.js").await.unwrap();
    let b = second.execute_id("/src/state.js").await.unwrap();
    assert!(a.strict_equals(&b));
    assert_eq!(fx.runs("/src/state.js"), 1);

    let isolated = fx.runner();
    isolated.execute_id("/src/state.js").await.unwrap();
    assert_eq!(fx.runs("/src/state.js"), 2);
}

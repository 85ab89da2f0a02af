mod common;

use common::{collect, sources};
use secureworker::{PrimitiveError, SecureWorker, StaticSources, WorkerError};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn run(main: &str, extra: &[(&str, &str)]) -> Vec<Value> {
    let mut entries = vec![("main", main)];
    entries.extend_from_slice(extra);

    let mut worker = SecureWorker::builder("main")
        .resolver(sources(&entries))
        .build()
        .unwrap();
    let received = collect(&worker);
    worker.run_until_idle();

    let messages = received.borrow().clone();
    messages
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let resolutions = Arc::new(AtomicUsize::new(0));
    let counter = resolutions.clone();

    let resolver = move |key: &str| -> Result<String, PrimitiveError> {
        match key {
            "main" => Ok(r#"
                SecureWorker.importScripts('lib');
                SecureWorker.importScripts('lib');
                SecureWorker.postMessage(loads);
            "#
            .to_string()),
            "lib" => {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("var loads = (typeof loads === 'number' ? loads : 0) + 1;".to_string())
            }
            other => Err(PrimitiveError::UnknownContentKey(other.to_string())),
        }
    };

    let mut worker = SecureWorker::builder("main").resolver(resolver).build().unwrap();
    let received = collect(&worker);
    worker.run_until_idle();

    assert_eq!(*received.borrow(), vec![json!(1)]);
    assert_eq!(resolutions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_self_import_is_a_noop() {
    let messages = run(
        r#"
        var evaluations = (typeof evaluations === 'number' ? evaluations : 0) + 1;
        SecureWorker.importScripts('main');
        SecureWorker.postMessage(evaluations);
    "#,
        &[],
    );

    assert_eq!(messages, vec![json!(1)]);
}

#[tokio::test]
async fn test_import_cycle_terminates() {
    let messages = run(
        r#"
        SecureWorker.importScripts('a');
        SecureWorker.postMessage([a, b]);
    "#,
        &[
            ("a", "SecureWorker.importScripts('b'); var a = 'a';"),
            ("b", "SecureWorker.importScripts('a'); var b = 'b';"),
        ],
    );

    assert_eq!(messages, vec![json!(["a", "b"])]);
}

#[tokio::test]
async fn test_failed_import_can_be_retried() {
    let messages = run(
        r#"
        try {
            SecureWorker.importScripts('flaky');
        } catch (e) {
            SecureWorker.postMessage(e.message.includes('not yet'));
        }

        globalThis.allowed = true;
        SecureWorker.importScripts('flaky');
        SecureWorker.postMessage(loaded);
    "#,
        &[(
            "flaky",
            "if (!globalThis.allowed) throw new Error('not yet'); var loaded = 'loaded';",
        )],
    );

    assert_eq!(messages, vec![json!(true), json!("loaded")]);
}

#[tokio::test]
async fn test_failure_does_not_abort_later_keys() {
    let messages = run(
        r#"
        try {
            SecureWorker.importScripts('missing', 'lib');
        } catch (e) {
            SecureWorker.postMessage([e instanceof Error, e.message.includes('missing')]);
        }
        SecureWorker.postMessage(typeof lib);
    "#,
        &[("lib", "var lib = 1;")],
    );

    assert_eq!(messages, vec![json!([true, true]), json!("number")]);
}

#[tokio::test]
async fn test_import_errors_name_the_content_key() {
    let messages = run(
        r#"
        try {
            SecureWorker.importScripts('broken');
        } catch (e) {
            SecureWorker.postMessage(e.message.includes("'broken'"));
        }

        SecureWorker.importScripts('tracer');
        SecureWorker.postMessage(trace.includes('tracer'));
    "#,
        &[
            ("broken", "this is not javascript"),
            ("tracer", "var trace = new Error('here').stack;"),
        ],
    );

    assert_eq!(messages, vec![json!(true), json!(true)]);
}

#[tokio::test]
async fn test_import_arguments_must_be_strings() {
    let messages = run(
        r#"
        try {
            SecureWorker.importScripts(42);
        } catch (e) {
            SecureWorker.postMessage(e instanceof TypeError);
        }
    "#,
        &[],
    );

    assert_eq!(messages, vec![json!(true)]);
}

#[tokio::test]
async fn test_construction_fails_on_unknown_key() {
    let result = SecureWorker::builder("nope")
        .resolver(StaticSources::new())
        .build();

    assert_eq!(
        result.err(),
        Some(WorkerError::Resolution {
            key: "nope".to_string(),
            source: PrimitiveError::UnknownContentKey("nope".to_string()),
        })
    );
}

#[tokio::test]
async fn test_construction_without_resolver_is_not_implemented() {
    let result = SecureWorker::builder("main").build();

    match result {
        Err(WorkerError::Resolution { key, source }) => {
            assert_eq!(key, "main");
            assert!(source.is_not_implemented());
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("construction should fail"),
    }
}

#[tokio::test]
async fn test_construction_fails_when_script_throws() {
    let result = SecureWorker::builder("main")
        .resolver(sources(&[("main", "throw new Error('boom');")]))
        .build();

    match result {
        Err(WorkerError::Evaluation { key, message }) => {
            assert_eq!(key, "main");
            assert!(message.contains("boom"), "{}", message);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("construction should fail"),
    }
}

mod common;

use common::{collect, run_script, sources};
use secureworker::attestation;
use secureworker::{
    AttestationStatement, CounterId, Message, PrimitiveError, Report, SecureWorker, SimulatedEnclave,
    TrustedPrimitives,
};
use serde_json::json;
use std::sync::Arc;

fn run_with_enclave(enclave: Arc<SimulatedEnclave>, main: &str) -> Vec<Message> {
    let mut worker = SecureWorker::builder("main")
        .resolver(sources(&[("main", main)]))
        .shared_primitives(enclave)
        .build()
        .unwrap();
    let received = collect(&worker);
    worker.run_until_idle();

    let messages = received.borrow().clone();
    messages
}

fn enclave() -> Arc<SimulatedEnclave> {
    Arc::new(SimulatedEnclave::new(b"primitives-test").unwrap())
}

#[tokio::test]
async fn test_unconfigured_primitives_throw() {
    let messages = run_script(
        r#"
        const attempt = (f) => {
            try {
                f();
                return null;
            } catch (e) {
                return [e instanceof Error, e.name, e.message];
            }
        };

        SecureWorker.postMessage([
            attempt(() => SecureWorker.monotonicCounters.create()),
            attempt(() => SecureWorker.getTrustedTime()),
            attempt(() => SecureWorker.getReport(new Uint8Array(64))),
        ]);
    "#,
    );

    assert_eq!(
        messages,
        vec![json!([
            [true, "NotImplementedError", "Not implemented: createMonotonicCounter"],
            [true, "NotImplementedError", "Not implemented: getTrustedTime"],
            [true, "NotImplementedError", "Not implemented: getReport"],
        ])]
    );
}

#[tokio::test]
async fn test_report_data_must_be_64_bytes() {
    let messages = run_with_enclave(
        enclave(),
        r#"
        const check = (data) => {
            try {
                SecureWorker.getReport(data);
                return 'ok';
            } catch (e) {
                return e.constructor.name;
            }
        };

        SecureWorker.postMessage([
            check(new Uint8Array(63)),
            check(new Uint8Array(65)),
            check('not bytes'),
            check(new Uint8Array(64)),
            check(new ArrayBuffer(64)),
        ]);
    "#,
    );

    assert_eq!(
        messages,
        vec![json!(["RangeError", "RangeError", "TypeError", "ok", "ok"])]
    );
}

#[tokio::test]
async fn test_monotonic_counters() {
    let messages = run_with_enclave(
        enclave(),
        r#"
        const counters = SecureWorker.monotonicCounters;
        const counter = counters.create();

        const results = [
            counter.uuid instanceof ArrayBuffer,
            counter.value,
            counters.increment(counter.uuid),
            counters.increment(new Uint8Array(counter.uuid)),
            counters.read(counter.uuid),
        ];

        counters.destroy(counter.uuid);

        try {
            counters.read(counter.uuid);
        } catch (e) {
            results.push(e.name, e.message);
        }

        SecureWorker.postMessage(results);
    "#,
    );

    assert_eq!(
        messages,
        vec![json!([true, 0, 1, 2, 2, "Error", "unknown monotonic counter"])]
    );
}

#[tokio::test]
async fn test_counters_are_private_to_a_worker() {
    let shared = enclave();

    let exported = run_with_enclave(
        shared.clone(),
        r#"
        const counter = SecureWorker.monotonicCounters.create();
        SecureWorker.postMessage(Array.from(new Uint8Array(counter.uuid)));
    "#,
    );
    let uuid = exported[0].to_string();

    let messages = run_with_enclave(
        shared,
        &format!(
            r#"
            try {{
                SecureWorker.monotonicCounters.read(new Uint8Array({}));
                SecureWorker.postMessage('readable');
            }} catch (e) {{
                SecureWorker.postMessage(e.message);
            }}
            "#,
            uuid
        ),
    );

    assert_eq!(messages, vec![json!("unknown monotonic counter")]);
}

#[tokio::test]
async fn test_terminate_releases_counters() {
    let shared = enclave();

    let mut worker = SecureWorker::builder("main")
        .resolver(sources(&[(
            "main",
            r#"
            const counter = SecureWorker.monotonicCounters.create();
            SecureWorker.monotonicCounters.increment(counter.uuid);
            SecureWorker.postMessage(Array.from(new Uint8Array(counter.uuid)));
            "#,
        )]))
        .shared_primitives(shared.clone())
        .build()
        .unwrap();
    let received = collect(&worker);
    worker.run_until_idle();

    let bytes: Vec<u8> = serde_json::from_value(received.borrow()[0].clone()).unwrap();
    let id = CounterId::from(bytes);
    let context = worker.context_handle().clone();

    assert_eq!(shared.read_monotonic_counter(&context, &id), Ok(1));

    worker.terminate();

    assert_eq!(
        shared.read_monotonic_counter(&context, &id),
        Err(PrimitiveError::UnknownCounter)
    );
}

#[tokio::test]
async fn test_trusted_time() {
    let messages = run_with_enclave(
        enclave(),
        r#"
        const first = SecureWorker.getTrustedTime();
        const second = SecureWorker.getTrustedTime();
        const bytes = (buf) => Array.from(new Uint8Array(buf)).join(',');

        SecureWorker.postMessage([
            first.currentTime.byteLength,
            first.timeSourceNonce.byteLength,
            bytes(first.timeSourceNonce) === bytes(second.timeSourceNonce),
        ]);
    "#,
    );

    assert_eq!(messages, vec![json!([8, 32, true])]);
}

#[tokio::test]
async fn test_report_attestation_round_trip() {
    let enclave = enclave();

    let messages = run_with_enclave(
        enclave.clone(),
        r#"
        const data = new Uint8Array(64);
        data.fill(7);
        const report = SecureWorker.getReport(data);
        SecureWorker.postMessage(Array.from(new Uint8Array(report)));
    "#,
    );

    let bytes: Vec<u8> = serde_json::from_value(messages[0].clone()).unwrap();
    let report = Report::from(bytes);

    let report_data = attestation::get_report_data(enclave.as_ref(), &report).unwrap();
    assert_eq!(report_data.as_bytes(), &[7u8; 64]);

    let quote = attestation::get_quote(enclave.as_ref(), &report).unwrap();
    assert_eq!(
        attestation::get_quote_data(enclave.as_ref(), &quote).unwrap(),
        report_data
    );

    let statement = attestation::get_remote_attestation(enclave.as_ref(), &quote).unwrap();
    assert!(attestation::validate_remote_attestation(
        enclave.as_ref(),
        &quote,
        &statement
    ));

    let mut tampered = statement.as_bytes().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xff;
    assert!(!attestation::validate_remote_attestation(
        enclave.as_ref(),
        &quote,
        &AttestationStatement::from(tampered)
    ));

    let garbage = AttestationStatement::from(vec![1, 2, 3]);
    assert!(!attestation::validate_remote_attestation(
        enclave.as_ref(),
        &quote,
        &garbage
    ));
}

#[tokio::test]
async fn test_worker_exposes_its_backend() {
    let worker = SecureWorker::builder("main")
        .resolver(sources(&[("main", "")]))
        .primitives(SimulatedEnclave::new(b"exposed").unwrap())
        .build()
        .unwrap();

    let report = Report::from(vec![0u8; 4]);
    assert!(attestation::get_report_data(worker.primitives().as_ref(), &report).is_err());
}

#![allow(dead_code)]

use secureworker::{Message, SecureWorker, StaticSources};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::LocalSet;

/// Runs an async function inside a LocalSet.
/// Required for tests that drive a worker while `spawn_local` tasks talk to it.
pub async fn run_in_local<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let local = LocalSet::new();
    local.run_until(f()).await
}

pub fn sources(entries: &[(&str, &str)]) -> StaticSources {
    entries
        .iter()
        .fold(StaticSources::new(), |sources, (key, source)| sources.with(*key, *source))
}

/// Build a worker for `main` with no trusted primitives bound.
pub fn spawn(main: &str) -> SecureWorker {
    SecureWorker::builder("main")
        .resolver(sources(&[("main", main)]))
        .build()
        .unwrap()
}

/// Record every message the worker posts to the host.
pub fn collect(worker: &SecureWorker) -> Rc<RefCell<Vec<Message>>> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    worker.on_message(move |message| sink.borrow_mut().push(message.clone()));
    received
}

/// Run the worker until idle and return everything it posted.
pub fn run_script(main: &str) -> Vec<Message> {
    let mut worker = spawn(main);
    let received = collect(&worker);
    worker.run_until_idle();
    let messages = received.borrow().clone();
    messages
}

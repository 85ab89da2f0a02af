//! The host-facing secure worker.
//!
//! A [`SecureWorker`] owns one isolate with a host realm and a sandbox
//! context, a FIFO task queue and the two event ports bridging host and
//! worker. Nothing runs on its own: the host drives the worker by ticking
//! it, either synchronously ([`SecureWorker::tick`],
//! [`SecureWorker::run_until_idle`]) or from an async task
//! ([`SecureWorker::next_tick`], [`SecureWorker::run`]).

use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::Message;
use crate::config::WorkerLimits;
use crate::error::WorkerError;
use crate::globals;
use crate::provider::{ContentResolver, ContextHandle, TrustedPrimitives, Unconfigured};
use crate::runtime::bindings::{HostListener, Lifecycle, ListenerId, WorkerState};
use crate::runtime::script::ScriptError;
use crate::runtime::{Runtime, Task};

/// A sandboxed script with a message channel to the host.
///
/// Not `Send`: the isolate is bound to the thread that created it. Use a
/// [`WorkerHandle`] to reach the worker from other threads.
pub struct SecureWorker {
    state: Rc<WorkerState>,
    task_rx: mpsc::UnboundedReceiver<Task>,
    runtime: Runtime,
}

/// Builder for [`SecureWorker`].
///
/// # Example
///
/// ```rust,ignore
/// let mut worker = SecureWorker::builder("main.js")
///     .resolver(DirectorySources::new("scripts"))
///     .primitives(SimulatedEnclave::new(b"dev")?)
///     .build()?;
///
/// worker.on_message(|message| println!("{}", message));
/// worker.post_message(json!({ "ping": 1 }))?;
/// worker.run_until_idle();
/// ```
pub struct SecureWorkerBuilder {
    content_key: String,
    resolver: Arc<dyn ContentResolver>,
    primitives: Arc<dyn TrustedPrimitives>,
    limits: WorkerLimits,
}

impl SecureWorkerBuilder {
    pub fn new(content_key: impl Into<String>) -> Self {
        Self {
            content_key: content_key.into(),
            resolver: Arc::new(Unconfigured),
            primitives: Arc::new(Unconfigured),
            limits: WorkerLimits::default(),
        }
    }

    /// Set the content resolver used for the worker's script and its imports.
    pub fn resolver(self, resolver: impl ContentResolver + 'static) -> Self {
        self.shared_resolver(Arc::new(resolver))
    }

    pub fn shared_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the trusted primitives backend.
    pub fn primitives(self, primitives: impl TrustedPrimitives + 'static) -> Self {
        self.shared_primitives(Arc::new(primitives))
    }

    pub fn shared_primitives(mut self, primitives: Arc<dyn TrustedPrimitives>) -> Self {
        self.primitives = primitives;
        self
    }

    /// Set the isolate heap limits
    pub fn limits(mut self, limits: WorkerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the sandbox, then resolve and evaluate the worker's own script.
    ///
    /// Messages the script posts while evaluating are queued, never delivered
    /// before this returns.
    pub fn build(self) -> Result<SecureWorker, WorkerError> {
        let curated = globals::curated_globals()?;
        let runtime = Runtime::new(&self.limits)?;

        let (scheduler_tx, task_rx) = mpsc::unbounded_channel();
        let state = Rc::new(WorkerState::new(
            ContextHandle::new(self.content_key),
            self.resolver,
            self.primitives,
            scheduler_tx,
            runtime.isolate.thread_safe_handle(),
        ));

        // From here on, Drop releases every V8 handle on failure.
        let mut worker = SecureWorker {
            state,
            task_rx,
            runtime,
        };

        worker.runtime.create_sandbox(&worker.state, curated)?;

        let key = worker.state.name().to_string();
        let source = worker
            .state
            .resolver
            .resolve_content_key(&key)
            .map_err(|source| WorkerError::Resolution {
                key: key.clone(),
                source,
            })?;

        match worker.runtime.evaluate(&key, &source) {
            Ok(()) => {}
            Err(ScriptError::Terminated) if worker.runtime.memory_limit_hit() => {
                return Err(WorkerError::Evaluation {
                    key,
                    message: "heap limit exceeded".to_string(),
                });
            }
            // The script called SecureWorker.close()
            Err(ScriptError::Terminated) => {}
            Err(ScriptError::Thrown(message)) => {
                return Err(WorkerError::Evaluation { key, message });
            }
        }

        worker.state.mark_running();
        worker.settle();

        log::debug!("worker '{}' started ({:?})", key, worker.lifecycle());
        Ok(worker)
    }
}

impl SecureWorker {
    pub fn builder(content_key: impl Into<String>) -> SecureWorkerBuilder {
        SecureWorkerBuilder::new(content_key)
    }

    /// The content key the worker was created from.
    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn context_handle(&self) -> &ContextHandle {
        &self.state.context
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// The backend bound to this worker, for host-side attestation calls.
    pub fn primitives(&self) -> &Arc<dyn TrustedPrimitives> {
        &self.state.primitives
    }

    /// A cloneable, `Send` handle for posting messages and terminating.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            name: Arc::from(self.name()),
            tx: self.state.sender(),
        }
    }

    /// Register a listener for messages the worker posts.
    ///
    /// The first registration starts delivery; messages posted earlier are
    /// delivered in order on a later tick.
    pub fn on_message<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Message) + 'static,
    {
        let id = self.state.next_listener_id();

        let has_backlog = {
            let mut outbound = self.state.outbound.borrow_mut();
            outbound.add_listener(HostListener {
                id,
                callback: Rc::new(listener),
            });
            outbound.start()
        };

        if has_backlog {
            self.state.schedule(Task::FlushOutbound);
        }

        id
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn remove_on_message(&self, id: ListenerId) {
        self.state
            .outbound
            .borrow_mut()
            .remove_listener_with(|listener| listener.id == id);
    }

    /// Queue a message for the worker. It is delivered on a later tick.
    pub fn post_message(&self, message: Message) -> Result<(), WorkerError> {
        if self.state.schedule(Task::PostInbound(message)) {
            Ok(())
        } else {
            log::debug!("worker '{}': post_message after termination", self.name());
            Err(WorkerError::Terminated)
        }
    }

    /// Process at most one queued task. Returns false if the queue was empty
    /// or the worker is terminated.
    pub fn tick(&mut self) -> bool {
        if self.state.is_terminated() {
            self.terminate();
            return false;
        }

        match self.task_rx.try_recv() {
            Ok(task) => {
                self.process(task);
                true
            }
            Err(_) => false,
        }
    }

    /// Tick until the queue is empty, including tasks enqueued while
    /// processing. Returns the number of tasks processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while self.tick() {
            processed += 1;
        }
        processed
    }

    /// Wait for the next task and process it. Returns false once terminated.
    pub async fn next_tick(&mut self) -> bool {
        if self.state.is_terminated() {
            self.terminate();
            return false;
        }

        match self.task_rx.recv().await {
            Some(task) => {
                self.process(task);
                true
            }
            None => false,
        }
    }

    /// Process tasks until the worker terminates.
    pub async fn run(&mut self) {
        while self.next_tick().await {}
    }

    /// Stop the worker. Idempotent.
    ///
    /// Both ports are closed, queued tasks and pending callbacks are
    /// discarded, and the contexts are released. The first call also
    /// releases the context's state in the primitives backend.
    pub fn terminate(&mut self) {
        let first = self.state.shutdown();

        self.task_rx.close();
        while self.task_rx.try_recv().is_ok() {}
        self.runtime.release();

        if first {
            self.state.primitives.release_context(&self.state.context);
            log::debug!("worker '{}' terminated", self.name());
        }
    }

    fn process(&mut self, task: Task) {
        match task {
            Task::PostInbound(message) => {
                let ready = self.state.inbound.borrow_mut().emit(message);
                self.runtime.deliver_inbound(&self.state, ready);
            }
            Task::FlushInbound => {
                let ready = self.state.inbound.borrow_mut().flush();
                self.runtime.deliver_inbound(&self.state, ready);
            }
            Task::PostOutbound(message) => {
                let ready = self.state.outbound.borrow_mut().emit(message);
                self.deliver_outbound(ready);
            }
            Task::FlushOutbound => {
                let ready = self.state.outbound.borrow_mut().flush();
                self.deliver_outbound(ready);
            }
            Task::Immediate(id) => self.runtime.run_immediate(&self.state, id),
            Task::Terminate => {
                self.terminate();
                return;
            }
        }

        self.settle();
    }

    /// Deliver to the host listeners registered at this moment.
    fn deliver_outbound(&self, messages: Vec<Message>) {
        for message in messages {
            let listeners: Vec<HostListener> = self.state.outbound.borrow().listeners().to_vec();

            for listener in listeners {
                (listener.callback)(&message);
            }
        }
    }

    /// End a tick: run promise continuations unless the worker stopped.
    fn settle(&mut self) {
        if !self.finish_if_terminated() {
            self.runtime.perform_microtask_checkpoint();
            self.finish_if_terminated();
        }
    }

    fn finish_if_terminated(&mut self) -> bool {
        if self.runtime.memory_limit_hit() {
            if !self.state.is_terminated() {
                log::error!("worker '{}' exceeded its heap limit", self.name());
            }
            self.terminate();
            return true;
        }

        if self.state.is_terminated() {
            self.terminate();
            return true;
        }

        false
    }
}

impl Drop for SecureWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Reaches a worker from any thread or task.
#[derive(Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Task>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a message for the worker.
    pub fn post_message(&self, message: Message) -> Result<(), WorkerError> {
        self.tx
            .send(Task::PostInbound(message))
            .map_err(|_| WorkerError::Terminated)
    }

    /// Ask the worker to terminate on its next tick.
    pub fn terminate(&self) {
        if self.tx.send(Task::Terminate).is_err() {
            log::trace!("worker '{}' already terminated", self.name);
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").field("name", &self.name).finish()
    }
}

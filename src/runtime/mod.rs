#[macro_use]
pub mod bindings;
pub mod crypto;
mod host_realm;
mod sandbox;
pub(crate) mod script;
pub mod text_encoding;

use std::ops::{Deref, DerefMut};
use std::pin::pin;
use std::rc::Rc;

use crate::Message;
use crate::config::WorkerLimits;
use crate::error::WorkerError;
use crate::security::{HeapGuard, install_heap_guard};
use crate::v8_helpers::throw_type_error;
use bindings::WorkerState;
use sandbox::Sandbox;
use script::ScriptError;

pub(crate) use host_realm::{missing_globals, setup_host_realm};

pub type CallbackId = u64;

/// Unit of work on a worker's FIFO queue. One task is processed per tick.
#[derive(Debug)]
pub enum Task {
    /// Host → worker message.
    PostInbound(Message),
    /// Worker → host message.
    PostOutbound(Message),
    /// Deliver the inbound backlog after the port was started.
    FlushInbound,
    /// Deliver the outbound backlog after the port was started.
    FlushOutbound,
    /// Run a `setImmediate` / `nextTick` callback.
    Immediate(CallbackId),
    /// Terminate the worker (sent through a `WorkerHandle`).
    Terminate,
}

/// Owns a worker's isolate and its two contexts.
///
/// Field order matters: the context handles are dropped before the isolate,
/// and the heap guard after it. The isolate is only entered while the
/// runtime is working, see `IsolateGuard`.
pub struct Runtime {
    host_realm: Option<v8::Global<v8::Context>>,
    context: Option<v8::Global<v8::Context>>,
    pub isolate: v8::OwnedIsolate,
    heap_guard: Box<HeapGuard>,
}

impl Runtime {
    /// Create an isolate with its host realm.
    ///
    /// The isolate is left unentered; every block of V8 work enters it
    /// through an `IsolateGuard`.
    pub fn new(limits: &WorkerLimits) -> Result<Self, WorkerError> {
        crate::platform::get_platform();

        let mut isolate = v8::Isolate::new(limits.create_params());
        // SAFETY: `Isolate::new` entered it and nothing was entered since.
        unsafe { isolate.exit() };

        let heap_guard = install_heap_guard(&mut isolate, limits.heap_max_bytes);

        let mut runtime = Self {
            host_realm: None,
            context: None,
            isolate,
            heap_guard,
        };

        let host_realm = {
            let mut isolate = IsolateGuard::enter(&mut runtime.isolate);
            isolate.set_microtasks_policy(v8::MicrotasksPolicy::Explicit);

            let scope = pin!(v8::HandleScope::new(&mut *isolate));
            let mut scope = scope.init();
            let context = v8::Context::new(&scope, Default::default());
            let scope = &mut v8::ContextScope::new(&mut scope, context);

            setup_host_realm(scope)
                .ok_or_else(|| WorkerError::Initialization("failed to set up host realm".to_string()))?;

            v8::Global::new(scope.as_ref(), context)
        };

        runtime.host_realm = Some(host_realm);
        Ok(runtime)
    }

    /// True once the heap limit forced a termination.
    pub fn memory_limit_hit(&self) -> bool {
        self.heap_guard.is_exhausted()
    }

    /// Create the sandbox context, seeded with the curated host globals and
    /// the trusted API bound to `state`.
    pub(crate) fn create_sandbox(
        &mut self,
        state: &Rc<WorkerState>,
        curated: &[&'static str],
    ) -> Result<(), WorkerError> {
        let host_realm = self.host_realm.as_ref().ok_or(WorkerError::Terminated)?;

        let mut isolate = IsolateGuard::enter(&mut self.isolate);
        let scope = pin!(v8::HandleScope::new(&mut *isolate));
        let mut scope = scope.init();

        let exports = {
            let host = v8::Local::new(&scope, host_realm);
            let scope = &mut v8::ContextScope::new(&mut scope, host);
            host_realm::export_globals(scope, curated)
        }
        .ok_or_else(|| WorkerError::Initialization("failed to read host realm globals".to_string()))?;

        let context = v8::Context::new(&scope, Default::default());
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        // Store in context slot so native callbacks can reach the worker
        scope.get_current_context().set_slot(state.clone());

        Sandbox::build(scope, state, &exports)
            .and_then(|sandbox| sandbox.install(scope))
            .ok_or_else(|| WorkerError::Initialization("failed to build sandbox".to_string()))?;

        self.context = Some(v8::Global::new(scope.as_ref(), context));
        Ok(())
    }

    /// Run a script in the sandbox.
    pub(crate) fn evaluate(&mut self, key: &str, source: &str) -> Result<(), ScriptError> {
        let Some(context) = self.context.as_ref() else {
            return Err(ScriptError::Terminated);
        };

        let mut isolate = IsolateGuard::enter(&mut self.isolate);
        let scope = pin!(v8::HandleScope::new(&mut *isolate));
        let mut scope = scope.init();
        let ctx = v8::Local::new(&scope, context);
        let scope = &mut v8::ContextScope::new(&mut scope, ctx);

        script::run_script(scope, key, source)
    }

    /// Deliver messages to the sandbox listeners registered at this moment.
    pub(crate) fn deliver_inbound(&mut self, state: &WorkerState, messages: Vec<Message>) {
        let Some(context) = self.context.as_ref() else {
            return;
        };

        let mut isolate = IsolateGuard::enter(&mut self.isolate);
        let scope = pin!(v8::HandleScope::new(&mut *isolate));
        let mut scope = scope.init();
        let ctx = v8::Local::new(&scope, context);
        let scope = &mut v8::ContextScope::new(&mut scope, ctx);

        for message in messages {
            if state.is_terminated() {
                return;
            }

            let Some(value) = deserialize_message(scope, &message) else {
                log::error!("worker '{}': failed to materialize inbound message", state.name());
                continue;
            };

            let listeners: Vec<v8::Local<v8::Function>> = state
                .inbound
                .borrow()
                .listeners()
                .iter()
                .map(|listener| v8::Local::new(scope, listener))
                .collect();

            for listener in listeners {
                if !call_guarded(scope, state.name(), listener, &[value], "message listener") {
                    return;
                }
            }
        }
    }

    /// Run a queued `setImmediate` / `nextTick` callback.
    pub(crate) fn run_immediate(&mut self, state: &WorkerState, id: CallbackId) {
        let Some(callback) = state.immediates.borrow_mut().remove(&id) else {
            return;
        };
        let Some(context) = self.context.as_ref() else {
            return;
        };

        let mut isolate = IsolateGuard::enter(&mut self.isolate);
        let scope = pin!(v8::HandleScope::new(&mut *isolate));
        let mut scope = scope.init();
        let ctx = v8::Local::new(&scope, context);
        let scope = &mut v8::ContextScope::new(&mut scope, ctx);

        let callback = v8::Local::new(scope, &callback);
        call_guarded(scope, state.name(), callback, &[], "immediate callback");
    }

    /// Run pending promise continuations.
    pub(crate) fn perform_microtask_checkpoint(&mut self) {
        if self.context.is_some() {
            IsolateGuard::enter(&mut self.isolate).perform_microtask_checkpoint();
        }
    }

    /// Drop both contexts. The isolate stays alive until the runtime is dropped.
    pub(crate) fn release(&mut self) {
        let _isolate = IsolateGuard::enter(&mut self.isolate);
        self.context.take();
        self.host_realm.take();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.release();

        // `OwnedIsolate` exits itself on drop and asserts it is the current
        // isolate, so enter it once more without a matching exit.
        // SAFETY: balanced by the exit in `OwnedIsolate::drop`.
        unsafe { self.isolate.enter() };
    }
}

/// Makes an isolate the thread's current one until dropped.
///
/// Worker isolates stay unentered between operations, so workers on one
/// thread can be driven and dropped in any order.
struct IsolateGuard<'i> {
    isolate: &'i mut v8::OwnedIsolate,
}

impl<'i> IsolateGuard<'i> {
    fn enter(isolate: &'i mut v8::OwnedIsolate) -> Self {
        // SAFETY: balanced by the exit in `Drop`.
        unsafe { isolate.enter() };
        Self { isolate }
    }
}

impl Deref for IsolateGuard<'_> {
    type Target = v8::Isolate;

    fn deref(&self) -> &v8::Isolate {
        self.isolate
    }
}

impl DerefMut for IsolateGuard<'_> {
    fn deref_mut(&mut self) -> &mut v8::Isolate {
        self.isolate
    }
}

impl Drop for IsolateGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: entered in `IsolateGuard::enter`; guards nest, so this
        // isolate is the current one again.
        unsafe { self.isolate.exit() };
    }
}

/// Call `func` with a TryCatch, logging anything it throws.
///
/// Returns false if execution was terminated.
fn call_guarded(
    scope: &mut v8::PinScope,
    worker: &str,
    func: v8::Local<v8::Function>,
    args: &[v8::Local<v8::Value>],
    what: &str,
) -> bool {
    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();

    let recv = v8::undefined(&tc);
    if func.call(&tc, recv.into(), args).is_some() {
        return true;
    }

    if tc.has_terminated() {
        return false;
    }

    let message = tc
        .exception()
        .and_then(|e| e.to_string(&tc).map(|s| s.to_rust_string_lossy(&tc)))
        .unwrap_or_else(|| "unknown error".to_string());
    log::error!("worker '{}': {} threw: {}", worker, what, message);

    true
}

/// Serialize a sandbox value for `postMessage`.
///
/// `undefined` becomes `null`. Returns `None` with an exception pending if
/// the value cannot be serialized.
pub(crate) fn serialize_message(scope: &mut v8::PinScope, value: v8::Local<v8::Value>) -> Option<Message> {
    if value.is_undefined() {
        return Some(Message::Null);
    }

    let json = v8::json::stringify(scope, value)?;
    let text = json.to_rust_string_lossy(scope);

    match serde_json::from_str(&text) {
        Ok(message) => Some(message),
        Err(_) => {
            throw_type_error(scope, "postMessage: message is not serializable");
            None
        }
    }
}

/// Turn a message into a fresh value of the current context.
fn deserialize_message<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    message: &Message,
) -> Option<v8::Local<'s, v8::Value>> {
    let json = v8::String::new(scope, &message.to_string())?;
    v8::json::parse(scope, json)
}

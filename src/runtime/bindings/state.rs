use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::super::{CallbackId, Task};
use crate::Message;
use crate::event_port::EventPort;
use crate::loader::ImportLedger;
use crate::provider::{ContentResolver, ContextHandle, TrustedPrimitives};

/// Where a worker is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    Terminated,
}

/// Returned by `on_message`, used to unregister a host listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A host-side message listener.
#[derive(Clone)]
pub struct HostListener {
    pub id: ListenerId,
    pub callback: Rc<dyn Fn(&Message)>,
}

impl PartialEq for HostListener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Per-worker state shared between the host façade and the native bindings.
///
/// Stored in the sandbox context slot so callbacks can reach it. Uses
/// `Rc`/`RefCell` because `v8::Global` is tied to the isolate's thread.
/// No `RefCell` borrow may be held while calling into JavaScript.
pub struct WorkerState {
    pub context: ContextHandle,
    pub resolver: Arc<dyn ContentResolver>,
    pub primitives: Arc<dyn TrustedPrimitives>,
    /// Host → worker. Listeners are sandbox functions.
    pub inbound: RefCell<EventPort<v8::Global<v8::Function>>>,
    /// Worker → host.
    pub outbound: RefCell<EventPort<HostListener>>,
    pub imports: RefCell<ImportLedger>,
    pub immediates: RefCell<HashMap<CallbackId, v8::Global<v8::Function>>>,
    pub ready: RefCell<Option<v8::Global<v8::Promise>>>,
    lifecycle: Cell<Lifecycle>,
    next_callback_id: Cell<CallbackId>,
    next_listener_id: Cell<u64>,
    scheduler_tx: mpsc::UnboundedSender<Task>,
    isolate_handle: v8::IsolateHandle,
}

impl WorkerState {
    pub fn new(
        context: ContextHandle,
        resolver: Arc<dyn ContentResolver>,
        primitives: Arc<dyn TrustedPrimitives>,
        scheduler_tx: mpsc::UnboundedSender<Task>,
        isolate_handle: v8::IsolateHandle,
    ) -> Self {
        let imports = ImportLedger::new(&context.name);

        Self {
            context,
            resolver,
            primitives,
            inbound: RefCell::new(EventPort::new("inbound")),
            outbound: RefCell::new(EventPort::new("outbound")),
            imports: RefCell::new(imports),
            immediates: RefCell::new(HashMap::new()),
            ready: RefCell::new(None),
            lifecycle: Cell::new(Lifecycle::Created),
            next_callback_id: Cell::new(1),
            next_listener_id: Cell::new(1),
            scheduler_tx,
            isolate_handle,
        }
    }

    /// The worker's content key.
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle.get() == Lifecycle::Terminated
    }

    pub fn mark_running(&self) {
        if self.lifecycle.get() == Lifecycle::Created {
            self.lifecycle.set(Lifecycle::Running);
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Task> {
        self.scheduler_tx.clone()
    }

    /// Enqueue a task for a later tick. Returns false once terminated.
    pub fn schedule(&self, task: Task) -> bool {
        if self.is_terminated() {
            return false;
        }

        self.scheduler_tx.send(task).is_ok()
    }

    pub fn next_callback_id(&self) -> CallbackId {
        let id = self.next_callback_id.get();
        self.next_callback_id.set(id + 1);
        id
    }

    pub fn next_listener_id(&self) -> ListenerId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        ListenerId(id)
    }

    /// Move to `Terminated`, close both ports and drop every V8 handle held here.
    ///
    /// Returns false if the worker was already terminated.
    pub fn shutdown(&self) -> bool {
        if self.is_terminated() {
            return false;
        }

        self.lifecycle.set(Lifecycle::Terminated);
        self.inbound.borrow_mut().close();
        self.outbound.borrow_mut().close();
        self.immediates.borrow_mut().clear();
        self.ready.borrow_mut().take();
        true
    }

    /// Shut down from inside the sandbox and unwind the running script.
    pub fn request_termination(&self) {
        if self.shutdown() {
            log::debug!("worker '{}' closed itself", self.name());
            self.isolate_handle.terminate_execution();
        }
    }
}

//! The `SecureWorker` object injected into every sandbox.

use super::{WorkerState, primitives};
use crate::error::WorkerError;
use crate::loader;
use crate::runtime::script::{ScriptError, run_script};
use crate::runtime::{Task, serialize_message};
use crate::v8_helpers::{set_property, throw_error, throw_type_error};

fn get_name(scope: &mut v8::PinScope, _args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);

    if let Some(name) = v8::String::new(scope, state.name()) {
        retval.set(name.into());
    }
}

/// Arms the inbound port; chained on `SecureWorker.ready` by `onMessage`.
fn start_inbound(scope: &mut v8::PinScope, _args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let has_backlog = state.inbound.borrow_mut().start();
    if has_backlog {
        state.schedule(Task::FlushInbound);
    }
}

fn on_message(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let Ok(listener) = v8::Local::<v8::Function>::try_from(args.get(0)) else {
        throw_type_error(scope, "onMessage: listener must be a function");
        return;
    };

    let global = v8::Global::new(scope, listener);
    let added = state
        .inbound
        .borrow_mut()
        .add_listener_with(global, |existing| {
            v8::Local::new(scope, existing).strict_equals(listener.into())
        });

    if added {
        let ready = state
            .ready
            .borrow()
            .as_ref()
            .map(|ready| v8::Local::new(scope, ready));

        if let Some(ready) = ready
            && let Some(start) = v8::Function::new(scope, start_inbound)
        {
            ready.then(scope, start);
        }
    }

    retval.set(listener.into());
}

fn remove_on_message(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);
    let listener = args.get(0);

    state
        .inbound
        .borrow_mut()
        .remove_listener_with(|existing| v8::Local::new(scope, existing).strict_equals(listener));
}

fn post_message(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let Some(message) = serialize_message(scope, args.get(0)) else {
        return;
    };

    if !state.schedule(Task::PostOutbound(message)) {
        log::debug!("worker '{}': postMessage after termination dropped", state.name());
    }
}

fn close(scope: &mut v8::PinScope, _args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);
    state.request_termination();
}

fn import_scripts(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let mut keys = Vec::with_capacity(args.length().max(0) as usize);
    for i in 0..args.length() {
        let arg = args.get(i);
        if !arg.is_string() {
            throw_type_error(scope, "importScripts: content keys must be strings");
            return;
        }
        keys.push(arg.to_rust_string_lossy(scope));
    }

    let mut first_failure: Option<WorkerError> = None;

    for key in &keys {
        if state.is_terminated() {
            return;
        }

        let result = loader::import_script(
            &state.imports,
            key,
            |key| {
                state
                    .resolver
                    .resolve_content_key(key)
                    .map_err(|source| WorkerError::Resolution {
                        key: key.to_string(),
                        source,
                    })
            },
            |key, source| match run_script(scope, key, source) {
                Ok(()) => Ok(()),
                Err(ScriptError::Terminated) => Err(WorkerError::Terminated),
                Err(ScriptError::Thrown(message)) => Err(WorkerError::Evaluation {
                    key: key.to_string(),
                    message,
                }),
            },
        );

        match result {
            Ok(outcome) => log::trace!("worker '{}': import '{}': {:?}", state.name(), key, outcome),
            Err(WorkerError::Terminated) => return,
            Err(e) => {
                log::debug!("worker '{}': {}", state.name(), e);
                first_failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_failure {
        throw_error(scope, &e.to_string());
    }
}

/// Build the `SecureWorker` object for a sandbox and record its `ready`
/// promise in `state`.
pub fn create_trusted_api<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &WorkerState,
) -> Option<v8::Local<'s, v8::Object>> {
    let api = v8::Object::new(scope);

    let resolver = v8::PromiseResolver::new(scope)?;
    let undefined = v8::undefined(scope);
    resolver.resolve(scope, undefined.into())?;
    let ready = resolver.get_promise(scope);
    *state.ready.borrow_mut() = Some(v8::Global::new(scope, ready));
    set_property(scope, api, "ready", ready.into())?;

    set_fn!(scope, api, "getName", get_name);
    set_fn!(scope, api, "onMessage", on_message);
    set_fn!(scope, api, "removeOnMessage", remove_on_message);
    set_fn!(scope, api, "postMessage", post_message);
    set_fn!(scope, api, "close", close);
    set_fn!(scope, api, "importScripts", import_scripts);

    primitives::install_primitives(scope, api)?;

    Some(api)
}

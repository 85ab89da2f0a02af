//! Trusted-computing primitives exposed on `SecureWorker`.
//!
//! Every call goes to the worker's bound [`TrustedPrimitives`] backend.
//! Backend failures surface as `Error`s created in the sandbox context;
//! operations the backend does not provide are named `NotImplementedError`.
//!
//! [`TrustedPrimitives`]: crate::provider::TrustedPrimitives

use crate::error::PrimitiveError;
use crate::provider::{CounterId, MonotonicCounter, ReportData};
use crate::v8_helpers::{
    bytes_from_value, create_array_buffer_from_vec, set_property, throw_range_error, throw_type_error,
};

use super::WorkerState;

const NOT_IMPLEMENTED_ERROR: &str = "NotImplementedError";

/// Operations with no backend bound throw a `NotImplementedError`; backend
/// failures throw a plain `Error`.
fn throw_primitive_error(scope: &mut v8::PinScope, state: &WorkerState, error: &PrimitiveError) {
    log::debug!("worker '{}': {}", state.name(), error);

    let Some(message) = v8::String::new(scope, &error.to_string()) else {
        return;
    };
    let exception = v8::Exception::error(scope, message);

    if error.is_not_implemented() {
        if let (Ok(obj), Some(name)) = (
            v8::Local::<v8::Object>::try_from(exception),
            v8::String::new(scope, NOT_IMPLEMENTED_ERROR),
        ) {
            set_property(scope, obj, "name", name.into());
        }
    }

    scope.throw_exception(exception);
}

fn counter_id_arg(scope: &mut v8::PinScope, value: v8::Local<v8::Value>) -> Option<CounterId> {
    match bytes_from_value(scope, value) {
        Some(bytes) => Some(CounterId::from(bytes)),
        None => {
            throw_type_error(scope, "counter id must be an ArrayBuffer or typed array");
            None
        }
    }
}

fn counter_object<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    counter: MonotonicCounter,
) -> Option<v8::Local<'s, v8::Object>> {
    let obj = v8::Object::new(scope);

    let uuid = create_array_buffer_from_vec(scope, counter.id.as_bytes().to_vec());
    set_property(scope, obj, "uuid", uuid.into())?;

    let value = v8::Number::new(scope, counter.value as f64);
    set_property(scope, obj, "value", value.into())?;

    Some(obj)
}

fn create_counter(scope: &mut v8::PinScope, _args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);

    match state.primitives.create_monotonic_counter(&state.context) {
        Ok(counter) => {
            if let Some(obj) = counter_object(scope, counter) {
                retval.set(obj.into());
            }
        }
        Err(e) => throw_primitive_error(scope, &state, &e),
    }
}

fn destroy_counter(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);
    let Some(id) = counter_id_arg(scope, args.get(0)) else {
        return;
    };

    if let Err(e) = state.primitives.destroy_monotonic_counter(&state.context, &id) {
        throw_primitive_error(scope, &state, &e);
    }
}

fn read_counter(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);
    let Some(id) = counter_id_arg(scope, args.get(0)) else {
        return;
    };

    match state.primitives.read_monotonic_counter(&state.context, &id) {
        Ok(value) => retval.set(v8::Number::new(scope, value as f64).into()),
        Err(e) => throw_primitive_error(scope, &state, &e),
    }
}

fn increment_counter(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);
    let Some(id) = counter_id_arg(scope, args.get(0)) else {
        return;
    };

    match state.primitives.increment_monotonic_counter(&state.context, &id) {
        Ok(value) => retval.set(v8::Number::new(scope, value as f64).into()),
        Err(e) => throw_primitive_error(scope, &state, &e),
    }
}

fn get_trusted_time(scope: &mut v8::PinScope, _args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let time = match state.primitives.get_trusted_time(&state.context) {
        Ok(time) => time,
        Err(e) => {
            throw_primitive_error(scope, &state, &e);
            return;
        }
    };

    let obj = v8::Object::new(scope);
    let current_time = create_array_buffer_from_vec(scope, time.current_time.to_vec());
    let nonce = create_array_buffer_from_vec(scope, time.time_source_nonce.to_vec());

    if set_property(scope, obj, "currentTime", current_time.into()).is_some()
        && set_property(scope, obj, "timeSourceNonce", nonce.into()).is_some()
    {
        retval.set(obj.into());
    }
}

fn get_report(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let Some(bytes) = bytes_from_value(scope, args.get(0)) else {
        throw_type_error(scope, "getReport: report data must be an ArrayBuffer or typed array");
        return;
    };

    let report_data = match ReportData::try_from(bytes.as_slice()) {
        Ok(data) => data,
        Err(e) => {
            throw_range_error(scope, &format!("getReport: {}", e));
            return;
        }
    };

    match state.primitives.get_report(&state.context, &report_data) {
        Ok(report) => {
            let buffer = create_array_buffer_from_vec(scope, report.as_bytes().to_vec());
            retval.set(buffer.into());
        }
        Err(e) => throw_primitive_error(scope, &state, &e),
    }
}

pub fn install_primitives(scope: &mut v8::PinScope, api: v8::Local<v8::Object>) -> Option<()> {
    let counters = v8::Object::new(scope);
    set_fn!(scope, counters, "create", create_counter);
    set_fn!(scope, counters, "destroy", destroy_counter);
    set_fn!(scope, counters, "read", read_counter);
    set_fn!(scope, counters, "increment", increment_counter);
    set_property(scope, api, "monotonicCounters", counters.into())?;

    set_fn!(scope, api, "getTrustedTime", get_trusted_time);
    set_fn!(scope, api, "getReport", get_report);

    Some(())
}

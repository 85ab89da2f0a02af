use super::super::Task;
use crate::v8_helpers::throw_type_error;

/// `setImmediate(fn)` / `nextTick(fn)`: run `fn` on a later host tick.
fn schedule_immediate(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, _retval: v8::ReturnValue) {
    let state = get_state!(scope);

    let Ok(callback) = v8::Local::<v8::Function>::try_from(args.get(0)) else {
        throw_type_error(scope, "callback must be a function");
        return;
    };

    if state.is_terminated() {
        return;
    }

    let id = state.next_callback_id();
    state
        .immediates
        .borrow_mut()
        .insert(id, v8::Global::new(scope, callback));
    state.schedule(Task::Immediate(id));
}

pub fn install_immediates(scope: &mut v8::PinScope, global: v8::Local<v8::Object>) -> Option<()> {
    set_fn!(scope, global, "nextTick", schedule_immediate);
    set_fn!(scope, global, "setImmediate", schedule_immediate);
    Some(())
}

use std::pin::pin;

use super::WorkerState;

const LOG_TARGET: &str = "secureworker::console";

const METHODS: [(&str, log::Level); 6] = [
    ("log", log::Level::Info),
    ("info", log::Level::Info),
    ("warn", log::Level::Warn),
    ("error", log::Level::Error),
    ("debug", log::Level::Debug),
    ("trace", log::Level::Trace),
];

/// Native console method. The function's data holds the index into `METHODS`.
fn console_log(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    _retval: v8::ReturnValue,
) {
    let level = args
        .data()
        .int32_value(scope)
        .and_then(|index| METHODS.get(index as usize))
        .map(|(_, level)| *level)
        .unwrap_or(log::Level::Info);

    if !log::log_enabled!(target: LOG_TARGET, level) {
        return;
    }

    let name = scope
        .get_current_context()
        .get_slot::<WorkerState>()
        .map(|state| state.name().to_string())
        .unwrap_or_else(|| "host".to_string());

    // Formatting may run user code (toJSON, toString); swallow anything it throws.
    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();

    let mut parts = Vec::with_capacity(args.length().max(0) as usize);
    for i in 0..args.length() {
        let arg = args.get(i);

        let text = if arg.is_symbol() {
            "Symbol()".to_string()
        } else if arg.is_object() && !arg.is_function() && !arg.is_native_error() {
            v8::json::stringify(&tc, arg)
                .map(|json| json.to_rust_string_lossy(&tc))
                .unwrap_or_else(|| "[object]".to_string())
        } else {
            arg.to_rust_string_lossy(&tc)
        };

        parts.push(text);
    }

    log::log!(target: LOG_TARGET, level, "[{}] {}", name, parts.join(" "));
}

/// Build a `console` object whose methods forward to the `log` facade.
pub fn create_console<'s>(scope: &mut v8::PinScope<'s, '_>) -> Option<v8::Local<'s, v8::Object>> {
    let console = v8::Object::new(scope);

    for (index, (name, _)) in METHODS.iter().enumerate() {
        let data = v8::Integer::new(scope, index as i32);
        let func = v8::Function::builder(console_log)
            .data(data.into())
            .build(scope)?;
        let key = v8::String::new(scope, name)?;
        console.set(scope, key.into(), func.into())?;
    }

    Some(console)
}

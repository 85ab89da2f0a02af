use std::pin::pin;

/// How a script failed to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScriptError {
    /// Execution was terminated (the worker closed itself or hit the heap limit).
    Terminated,
    /// Compilation failed or the script threw; holds the stringified exception.
    Thrown(String),
}

/// Compile and run `source` in the current context, tagged with `key` so
/// stack traces name the content key it came from.
pub(crate) fn run_script(scope: &mut v8::PinScope, key: &str, source: &str) -> Result<(), ScriptError> {
    let tagged = format!("{}\n//# sourceURL={}", source, key.replace(['\r', '\n'], " "));

    let Some(code) = v8::String::new(scope, &tagged) else {
        return Err(ScriptError::Thrown("source text is too large".to_string()));
    };

    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();

    let completed = v8::Script::compile(&tc, code, None)
        .and_then(|script| script.run(&tc))
        .is_some();

    if completed {
        return Ok(());
    }

    if tc.has_terminated() {
        return Err(ScriptError::Terminated);
    }

    let message = tc
        .exception()
        .and_then(|e| e.to_string(&tc).map(|s| s.to_rust_string_lossy(&tc)))
        .unwrap_or_else(|| "unknown error".to_string());

    Err(ScriptError::Thrown(message))
}

//! Common macros for V8 bindings.
//!
//! Setup code returns `Option<()>`; the macros bail out with `None` when V8
//! fails to allocate a handle.

/// Create a native function and store it as `$obj[$name]`.
///
/// # Example
/// ```ignore
/// set_fn!(scope, api, "getName", get_name);
/// ```
macro_rules! set_fn {
    ($scope:expr, $obj:expr, $name:literal, $callback:expr) => {{
        let func = v8::Function::new($scope, $callback)?;
        let key = v8::String::new($scope, $name)?;
        $obj.set($scope, key.into(), func.into())?;
    }};
}

/// Get the worker state from the current context slot, or return from the
/// enclosing callback if there is none.
///
/// # Example
/// ```ignore
/// let state = get_state!(scope);
/// ```
macro_rules! get_state {
    ($scope:expr) => {
        match $scope
            .get_current_context()
            .get_slot::<$crate::runtime::bindings::WorkerState>()
        {
            Some(state) => state,
            None => return,
        }
    };
}

/// Execute JavaScript setup code in the current context.
///
/// # Example
/// ```ignore
/// exec_js!(scope, r#"globalThis.foo = 42;"#);
/// ```
macro_rules! exec_js {
    ($scope:expr, $code:expr) => {{
        let code_str = v8::String::new($scope, $code)?;
        let script = v8::Script::compile($scope, code_str, None)?;
        script.run($scope)?
    }};
}

//! Global namespace curation.
//!
//! A fresh V8 context already carries its own ECMAScript builtins. Copying
//! the host realm's versions over them would make `Array !== [].constructor`
//! inside the sandbox, so only candidates the fresh context lacks are copied.
//! The retained list is computed once per process in a scratch isolate.

use std::pin::pin;
use std::sync::OnceLock;

use crate::error::WorkerError;
use crate::runtime;

/// Host globals considered for copying into a sandbox.
pub const CANDIDATE_GLOBALS: &[&str] = &[
    "NaN",
    "Infinity",
    "undefined",
    "Object",
    "Function",
    "Array",
    "String",
    "Boolean",
    "Number",
    "Date",
    "RegExp",
    "Error",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
    "Math",
    "JSON",
    "ArrayBuffer",
    "DataView",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
    "eval",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "unescape",
    "console",
    "TextEncoder",
    "TextDecoder",
    "atob",
    "btoa",
];

static CURATED: OnceLock<Result<Vec<&'static str>, String>> = OnceLock::new();

/// The candidates a fresh context does not provide natively.
///
/// Computed on first use and cached for the process, failures included.
pub fn curated_globals() -> Result<&'static [&'static str], WorkerError> {
    CURATED
        .get_or_init(|| {
            let result = compute_curated_globals(CANDIDATE_GLOBALS);
            match &result {
                Ok(retained) => log::debug!("curated sandbox globals: {:?}", retained),
                Err(e) => log::error!("global curation failed: {}", e),
            }
            result
        })
        .as_deref()
        .map_err(|e| WorkerError::Configuration(e.clone()))
}

fn compute_curated_globals(candidates: &[&'static str]) -> Result<Vec<&'static str>, String> {
    crate::platform::get_platform();

    let mut isolate = v8::Isolate::new(Default::default());
    let scope = pin!(v8::HandleScope::new(&mut isolate));
    let mut scope = scope.init();

    {
        let host = v8::Context::new(&scope, Default::default());
        let scope = &mut v8::ContextScope::new(&mut scope, host);

        runtime::setup_host_realm(scope).ok_or("failed to set up scratch host realm")?;

        let missing = runtime::missing_globals(scope, candidates).ok_or("failed to inspect host realm")?;
        if let Some(name) = missing.first() {
            return Err(format!("Missing property in global context: {}", name));
        }
    }

    let blank = v8::Context::new(&scope, Default::default());
    let scope = &mut v8::ContextScope::new(&mut scope, blank);

    let mut retained = Vec::new();
    for &name in candidates {
        if !evaluates(scope, name) {
            retained.push(name);
        }
    }

    Ok(retained)
}

/// True if the bare identifier `name` evaluates without throwing.
fn evaluates(scope: &mut v8::PinScope, name: &str) -> bool {
    let Some(code) = v8::String::new(scope, name) else {
        return false;
    };

    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();

    v8::Script::compile(&tc, code, None)
        .and_then(|script| script.run(&tc))
        .is_some()
}

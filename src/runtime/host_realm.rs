//! The host realm: a context standing in for the host's own global object.
//!
//! It carries the ECMAScript builtins plus the globals the host provides on
//! top (`console`, `TextEncoder`, `TextDecoder`, `atob`, `btoa`). Sandboxes
//! receive copies of the curated subset of its bindings.

use super::{bindings, text_encoding};
use crate::v8_helpers::set_property;

/// Install the host-provided globals into the current context.
pub(crate) fn setup_host_realm(scope: &mut v8::PinScope) -> Option<()> {
    let global = scope.get_current_context().global(scope);

    let console = bindings::create_console(scope)?;
    set_property(scope, global, "console", console.into())?;

    text_encoding::setup_text_encoding(scope)?;
    bindings::setup_base64(scope)?;

    Some(())
}

/// Names in `candidates` that are not own properties of the current global.
pub(crate) fn missing_globals(scope: &mut v8::PinScope, candidates: &[&'static str]) -> Option<Vec<&'static str>> {
    let global = scope.get_current_context().global(scope);
    let mut missing = Vec::new();

    for &name in candidates {
        let key = v8::String::new(scope, name)?;
        if !global.has_own_property(scope, key.into())? {
            missing.push(name);
        }
    }

    Some(missing)
}

/// Read the bindings for `names` from the current global.
pub(crate) fn export_globals(
    scope: &mut v8::PinScope,
    names: &[&'static str],
) -> Option<Vec<(&'static str, v8::Global<v8::Value>)>> {
    let global = scope.get_current_context().global(scope);

    names
        .iter()
        .map(|&name| {
            let key = v8::String::new(scope, name)?;
            let value = global.get(scope, key.into())?;
            Some((name, v8::Global::new(scope, value)))
        })
        .collect()
}

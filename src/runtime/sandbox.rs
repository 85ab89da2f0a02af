//! Sandbox builder: the complete surface injected into a fresh worker context.

use super::{bindings, crypto};
use super::bindings::WorkerState;
use crate::v8_helpers::set_property;

/// Everything a sandbox global receives besides the context's own builtins.
pub(crate) struct Sandbox<'s> {
    /// The trusted API object (`SecureWorker`).
    pub secure_worker: v8::Local<'s, v8::Object>,
    /// The sandbox's native `Promise`; its continuations run on host ticks.
    pub promise: v8::Local<'s, v8::Value>,
    pub crypto: v8::Local<'s, v8::Object>,
    pub console: v8::Local<'s, v8::Object>,
    /// Curated host realm bindings, copied by name.
    pub host_globals: Vec<(&'static str, v8::Local<'s, v8::Value>)>,
}

impl<'s> Sandbox<'s> {
    /// Build the surface inside the current (sandbox) context.
    pub fn build(
        scope: &mut v8::PinScope<'s, '_>,
        state: &WorkerState,
        host_globals: &[(&'static str, v8::Global<v8::Value>)],
    ) -> Option<Self> {
        let global = scope.get_current_context().global(scope);
        let promise_key = v8::String::new(scope, "Promise")?;
        let promise = global.get(scope, promise_key.into())?;

        Some(Self {
            secure_worker: bindings::create_trusted_api(scope, state)?,
            promise,
            crypto: crypto::create_crypto(scope)?,
            console: bindings::create_console(scope)?,
            host_globals: host_globals
                .iter()
                .map(|(name, value)| (*name, v8::Local::new(scope, value)))
                .collect(),
        })
    }

    /// Define the surface on the current global object.
    pub fn install(self, scope: &mut v8::PinScope<'s, '_>) -> Option<()> {
        let global = scope.get_current_context().global(scope);

        for (name, value) in self.host_globals {
            set_property(scope, global, name, value)?;
        }

        set_property(scope, global, "SecureWorker", self.secure_worker.into())?;
        set_property(scope, global, "Promise", self.promise)?;
        set_property(scope, global, "crypto", self.crypto.into())?;
        set_property(scope, global, "console", self.console.into())?;
        bindings::install_immediates(scope, global)?;

        exec_js!(
            scope,
            r#"
            globalThis.self = globalThis;
            globalThis.global = globalThis;
        "#
        );

        Some(())
    }
}

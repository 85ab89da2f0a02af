//! Heap limit protection for worker isolates.
//!
//! V8's default reaction to reaching the heap limit is
//! `FatalProcessOutOfMemory`, which takes the host down with the worker. A
//! near-heap-limit callback intercepts that: the first time it raises the
//! limit by 10% (capped at the configured maximum) so a GC can run, after
//! that it marks the guard exhausted and terminates execution. The worker
//! notices the flag after the current task and terminates itself.

use std::ffi::{c_char, c_void};
use std::sync::atomic::{AtomicBool, Ordering};

use v8::IsolateHandle;

/// Heap guard passed to V8 as the callback's data pointer.
///
/// Must outlive the isolate it is installed on.
pub struct HeapGuard {
    isolate_handle: IsolateHandle,
    max_heap_bytes: usize,
    grace_used: AtomicBool,
    exhausted: AtomicBool,
}

impl HeapGuard {
    pub fn new(isolate_handle: IsolateHandle, max_heap_bytes: usize) -> Self {
        Self {
            isolate_handle,
            max_heap_bytes,
            grace_used: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
        }
    }

    /// True once the heap limit forced a termination.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    fn next_limit(&self, current_heap_limit: usize) -> Option<usize> {
        if self.grace_used.swap(true, Ordering::SeqCst) {
            return None;
        }

        let raised = (current_heap_limit + current_heap_limit / 10).min(self.max_heap_bytes);
        (raised > current_heap_limit).then_some(raised)
    }
}

/// # Safety
///
/// `data` must point to the `HeapGuard` registered by [`install_heap_guard`].
unsafe extern "C" fn near_heap_limit_callback(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: data is the HeapGuard boxed by install_heap_guard, alive as long as the isolate
    let guard = unsafe { &*(data as *const HeapGuard) };

    if let Some(raised) = guard.next_limit(current_heap_limit) {
        tracing::warn!(
            "worker heap near limit ({} MB), raising to {} MB for a final GC",
            current_heap_limit / (1024 * 1024),
            raised / (1024 * 1024)
        );
        return raised;
    }

    tracing::error!(
        "worker heap limit of {} MB exhausted, terminating execution",
        guard.max_heap_bytes / (1024 * 1024)
    );

    guard.exhausted.store(true, Ordering::SeqCst);
    guard.isolate_handle.terminate_execution();

    current_heap_limit
}

/// Logs allocations V8 cannot recover from. Cannot prevent the abort.
unsafe extern "C" fn oom_error_handler(location: *const c_char, details: &v8::OomDetails) {
    let location = if location.is_null() {
        "unknown".into()
    } else {
        // SAFETY: V8 passes a valid C string
        unsafe { std::ffi::CStr::from_ptr(location) }.to_string_lossy()
    };

    let kind = if details.is_heap_oom {
        "JavaScript heap"
    } else {
        "process/external memory"
    };

    tracing::error!("V8 OOM at {}: {} out of memory", location, kind);
}

/// Install the heap guard on a freshly created isolate.
///
/// The returned box must be kept alive for the lifetime of the isolate.
pub fn install_heap_guard(isolate: &mut v8::Isolate, max_heap_bytes: usize) -> Box<HeapGuard> {
    let guard = Box::new(HeapGuard::new(isolate.thread_safe_handle(), max_heap_bytes));
    let guard_ptr = &*guard as *const HeapGuard as *mut c_void;

    isolate.add_near_heap_limit_callback(near_heap_limit_callback, guard_ptr);
    isolate.set_oom_error_handler(oom_error_handler);

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grace_is_granted_once() {
        crate::platform::get_platform();

        let isolate = v8::Isolate::new(Default::default());
        let guard = HeapGuard::new(isolate.thread_safe_handle(), 100 * 1024 * 1024);

        assert_eq!(guard.next_limit(50 * 1024 * 1024), Some(55 * 1024 * 1024));
        assert_eq!(guard.next_limit(55 * 1024 * 1024), None);
        assert!(!guard.is_exhausted());
    }

    #[test]
    fn test_grace_never_exceeds_max() {
        crate::platform::get_platform();

        let isolate = v8::Isolate::new(Default::default());
        let guard = HeapGuard::new(isolate.thread_safe_handle(), 32 * 1024 * 1024);

        assert_eq!(guard.next_limit(32 * 1024 * 1024), None);
    }

    #[test]
    fn test_guarded_isolate_runs_scripts() {
        use std::pin::pin;

        crate::platform::get_platform();

        let params = v8::CreateParams::default().heap_limits(4 * 1024 * 1024, 32 * 1024 * 1024);
        let mut isolate = v8::Isolate::new(params);
        let guard = install_heap_guard(&mut isolate, 32 * 1024 * 1024);

        {
            let scope = pin!(v8::HandleScope::new(&mut isolate));
            let mut scope = scope.init();
            let context = v8::Context::new(&scope, Default::default());
            let scope = &mut v8::ContextScope::new(&mut scope, context);

            let code = v8::String::new(scope, "1 + 1").unwrap();
            let script = v8::Script::compile(scope, code, None).unwrap();
            let result = script.run(scope).unwrap();

            assert_eq!(result.int32_value(scope).unwrap(), 2);
        }

        assert!(!guard.is_exhausted());

        // The guard must outlive the isolate it is installed on.
        drop(isolate);
        drop(guard);
    }
}

//! Resource configuration for worker isolates.

use serde::Deserialize;

const MIB: usize = 1024 * 1024;

/// Heap limits applied to each worker's isolate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerLimits {
    /// Initial V8 heap size in bytes.
    pub heap_initial_bytes: usize,
    /// Hard V8 heap limit in bytes. Reaching it terminates the worker's
    /// execution instead of aborting the process.
    pub heap_max_bytes: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            heap_initial_bytes: MIB,
            heap_max_bytes: 128 * MIB,
        }
    }
}

impl WorkerLimits {
    pub(crate) fn create_params(&self) -> v8::CreateParams {
        v8::CreateParams::default().heap_limits(self.heap_initial_bytes, self.heap_max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let limits: WorkerLimits =
            serde_json::from_str(r#"{ "heap_max_bytes": 33554432 }"#).unwrap();

        assert_eq!(limits.heap_initial_bytes, MIB);
        assert_eq!(limits.heap_max_bytes, 32 * MIB);
    }
}

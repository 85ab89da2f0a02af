//! Resource protection for worker isolates.
//!
//! - [`heap_limit`]: terminates a worker's execution when its V8 heap is
//!   exhausted instead of letting V8 abort the whole process.

pub mod heap_limit;

pub use heap_limit::{HeapGuard, install_heap_guard};

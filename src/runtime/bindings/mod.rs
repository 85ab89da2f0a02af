#[macro_use]
mod macros;

mod console;
mod primitives;
mod state;
mod timers;
mod trusted_api;
mod web_api;

// Re-export state types
pub use state::{HostListener, Lifecycle, ListenerId, WorkerState};

// Re-export setup functions
pub use console::create_console;
pub use timers::install_immediates;
pub use trusted_api::create_trusted_api;
pub use web_api::setup_base64;

pub mod attestation;
pub mod config;
pub mod error;
pub mod event_port;
pub mod globals;
pub mod loader;
pub mod platform;
pub mod provider;
pub mod runtime;
pub mod security;
pub mod v8_helpers;
pub mod worker;

/// A message crossing the host/worker boundary.
pub type Message = serde_json::Value;

// Core API
pub use config::WorkerLimits;
pub use error::{PrimitiveError, Result, WorkerError};
pub use runtime::bindings::{Lifecycle, ListenerId};
pub use worker::{SecureWorker, SecureWorkerBuilder, WorkerHandle};

pub use provider::{
    AttestationStatement, ContentResolver, ContextHandle, CounterId, DirectorySources,
    MonotonicCounter, Quote, Report, ReportData, SimulatedEnclave, StaticSources,
    TrustedPrimitives, TrustedTime, Unconfigured,
};

//! Error types for the secure worker engine.

use thiserror::Error;

/// Errors raised by a trusted primitive provider or content resolver.
///
/// `NotImplemented` is kept distinct from the other variants so callers can
/// tell an unconfigured deployment apart from a backend that rejected the
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unknown content key: {0}")]
    UnknownContentKey(String),

    #[error("unknown monotonic counter")]
    UnknownCounter,

    #[error("resource exhausted: {0}")]
    Exhausted(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl PrimitiveError {
    /// True if no backend was bound for the operation.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, PrimitiveError::NotImplemented(_))
    }
}

/// Errors surfaced by the worker façade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// A required global is missing from the host realm. Fatal for the process.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A content key could not be turned into source text.
    #[error("failed to resolve content key '{key}': {source}")]
    Resolution {
        key: String,
        #[source]
        source: PrimitiveError,
    },

    /// Source text failed to compile or threw while evaluating.
    #[error("evaluation of '{key}' failed: {message}")]
    Evaluation { key: String, message: String },

    /// The isolate or its contexts could not be set up.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// The worker was terminated.
    #[error("worker terminated")]
    Terminated,

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

//! Error types for the terminal-host runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising the worker or brokering channels.
#[derive(Debug, Error)]
pub enum Error {
    /// The worker executable could not be located.
    #[error("terminal-host worker executable not found. Set TERMHOST_WORKER_EXE or install the worker next to the host binary.")]
    WorkerNotFound,

    /// The worker process could not be created. Fatal to the `start` call
    /// that triggered it; never retried internally.
    #[error("failed to spawn terminal-host worker: {0}")]
    Spawn(String),

    /// `start` was called while a worker is already live.
    #[error("supervisor already started a worker")]
    AlreadyStarted,

    /// A connection was requested before `start` or after the worker exited.
    #[error("no active terminal-host worker")]
    NoActiveWorker,

    /// The underlying link to the worker is gone.
    #[error("worker channel closed unexpectedly")]
    ChannelClosed,

    /// Malformed or oversized traffic on the worker pipe.
    #[error("transport error: {0}")]
    Transport(String),

    /// The worker answered a request with an error.
    #[error("{}: {message}", name.as_deref().unwrap_or("WorkerError"))]
    Worker {
        /// Error type name reported by the worker, if any.
        name: Option<String>,
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the failure means the worker is unusable, as opposed
    /// to a single request going wrong.
    pub fn is_worker_gone(&self) -> bool {
        matches!(self, Error::NoActiveWorker | Error::ChannelClosed)
    }
}

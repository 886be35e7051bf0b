//! Error types for the batch adapter

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors that can occur while dispatching to or reconciling with a backend
#[derive(Debug, Error)]
pub enum BatchError {
    /// A required backend target (queue, endpoint) is missing or nonsensical.
    /// Raised at construction, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A job's requirement cannot be satisfied even after rounding up.
    #[error("insufficient {dimension}: requested {requested}, limit {limit}")]
    InsufficientResources {
        /// Which dimension overflowed (cores, memory, disk)
        dimension: &'static str,
        requested: u64,
        limit: u64,
    },

    /// A registry key was inserted twice. Contract violation, not retried.
    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    /// A registry key was looked up that is not registered.
    #[error("unknown job id: {0}")]
    UnknownId(String),

    /// The backend rate-limited us.
    #[error("backend rate limited (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// The backend or the network hiccupped in a way worth retrying.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Retries exhausted; the backend is considered unreachable.
    #[error("backend unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: usize,
        #[source]
        source: Box<BatchError>,
    },

    /// The backend does not know the referenced object.
    #[error("not found on backend: {0}")]
    NotFound(String),

    /// The backend rejected a request for a non-transient reason.
    #[error("backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A spawned backend tool could not run or exited uselessly.
    #[error("backend command {command:?} failed: {message}")]
    Command { command: String, message: String },

    /// Backend output could not be understood.
    #[error("failed to parse backend response: {0}")]
    Parse(String),
}

impl BatchError {
    /// Create an API error from status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            429 => Self::RateLimited { status, message },
            s if s >= 500 => Self::Transient(format!("status {s}: {message}")),
            _ => Self::Api { status, message },
        }
    }

    /// Whether the retry wrapper should try this call again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Check if this error means the backend no longer knows the object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for BatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            // Connectivity hiccups are retryable
            Self::Transient(err.to_string())
        } else {
            Self::Parse(err.to_string())
        }
    }
}

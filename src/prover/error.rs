//! Error types for the remote proving client.
//!
//! [`ProverError`] separates two kinds of failure that callers treat differently:
//! service failures, where the prover understood the job and explicitly refused
//! or failed it, and everything else (transport, auth, local I/O).

use thiserror::Error;

/// Errors that can occur while talking to the proving service.
#[derive(Debug, Error)]
pub enum ProverError {
    /// The request never got a usable HTTP response (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP 401/403: the credential was missing, wrong or revoked.
    #[error("unauthorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Any other 4xx on submission: the service authenticated us and rejected the job.
    #[error("rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Any other 4xx on a poll or download, after the job was accepted.
    #[error("unexpected response (status {status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// HTTP 5xx.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The service reported the proof attempt itself as failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Local validation refused the input before anything was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The service answered with a body that could not be understood.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Polling gave up after too many consecutive transient failures.
    #[error("gave up after {attempts} consecutive poll failures, last: {last_error}")]
    PollingExhausted { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProverError {
    /// Message supplied by the service when it explicitly rejected or failed the job.
    ///
    /// `Some` exactly for service failures; these end a job as `FAILED`.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            ProverError::Rejected { message, .. } | ProverError::ExecutionFailed(message) => {
                Some(message)
            }
            _ => None,
        }
    }

    /// Whether the same request may succeed if simply repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProverError::Network(_) | ProverError::Server { .. } | ProverError::RateLimited { .. }
        )
    }

    /// Stable category name recorded alongside infrastructure faults.
    pub fn category(&self) -> &'static str {
        match self {
            ProverError::Network(_) => "NetworkError",
            ProverError::Unauthorized { .. } => "Unauthorized",
            ProverError::Rejected { .. } => "Rejected",
            ProverError::UnexpectedStatus { .. } => "UnexpectedStatus",
            ProverError::Server { .. } => "ServerError",
            ProverError::RateLimited { .. } => "RateLimited",
            ProverError::ExecutionFailed(_) => "ExecutionFailed",
            ProverError::Validation(_) => "ValidationError",
            ProverError::Parse(_) => "ParseError",
            ProverError::PollingExhausted { .. } => "PollingExhausted",
            ProverError::Io(_) => "IoError",
        }
    }
}

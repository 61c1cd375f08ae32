//! Engine error types.

use std::time::Duration;

use slidecast_media::MediaError;
use slidecast_models::EngineKind;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The engine answered with an error status other than 503
    #[error("Engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::ServiceUnavailable(_) | EngineError::Timeout(_) => true,
            EngineError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            EngineError::Timeout(_) => true,
            EngineError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status the engine answered with, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            EngineError::ServiceUnavailable(_) => Some(503),
            EngineError::Status { status, .. } => Some(*status),
            EngineError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error is a local process that ran and exited non-zero.
    pub fn is_nonzero_exit(&self) -> bool {
        matches!(self, EngineError::Media(e) if e.is_nonzero_exit())
    }
}

/// Outcome of a call made through a circuit breaker.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The breaker rejected the call without running it
    #[error("circuit breaker open for {0}")]
    Open(EngineKind),

    /// The call exceeded the per-kind timeout
    #[error("{kind} call timed out after {timeout:?}")]
    Timeout { kind: EngineKind, timeout: Duration },

    /// The call ran and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> GuardError<E> {
    pub fn inner(&self) -> Option<&E> {
        match self {
            GuardError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

//! Worker error types.

use slidecast_engines::{EngineError, GuardError};
use slidecast_models::{EngineKind, ErrorKind, TransitionError};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("A phase is already running for job {0}")]
    PhaseInProgress(String),

    #[error("Corrected timeline not available for job {0}")]
    TimelineNotReady(String),

    #[error("Transition rejected: {0}")]
    Transition(#[from] TransitionError),

    #[error("{kind} timed out: {message}")]
    EngineTimeout { kind: EngineKind, message: String },

    #[error("{kind} failed: {message}")]
    EngineFailure { kind: EngineKind, message: String },

    #[error("Circuit breaker open for {0}")]
    BreakerOpen(EngineKind),

    #[error("Both extraction branches failed (audio: {audio}; video: {video})")]
    BranchesFailed {
        kind: ErrorKind,
        audio: String,
        video: String,
    },

    #[error("Duration unresolved: {0}")]
    DurationUnresolved(String),

    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] slidecast_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_timeline(msg: impl Into<String>) -> Self {
        Self::InvalidTimeline(msg.into())
    }

    pub fn duration_unresolved(msg: impl Into<String>) -> Self {
        Self::DurationUnresolved(msg.into())
    }

    pub fn composition_failed(msg: impl Into<String>) -> Self {
        Self::CompositionFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify the outcome of a breaker-guarded engine call.
    pub fn from_guard(kind: EngineKind, err: GuardError<EngineError>) -> Self {
        match err {
            GuardError::Open(kind) => Self::BreakerOpen(kind),
            GuardError::Timeout { kind, timeout } => Self::EngineTimeout {
                kind,
                message: format!("no answer within {:?}", timeout),
            },
            GuardError::Inner(e) if e.is_timeout() => Self::EngineTimeout {
                kind,
                message: e.to_string(),
            },
            GuardError::Inner(e) => Self::EngineFailure {
                kind,
                message: e.to_string(),
            },
        }
    }

    /// Error kind recorded on a job this error failed, `None` for errors
    /// that reject a request without touching the job.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            WorkerError::EngineTimeout { .. } => Some(ErrorKind::ExternalEngineTimeout),
            WorkerError::EngineFailure { .. } => Some(ErrorKind::ExternalEngineFailure),
            WorkerError::BreakerOpen(_) => Some(ErrorKind::BreakerOpen),
            WorkerError::BranchesFailed { kind, .. } => Some(*kind),
            WorkerError::DurationUnresolved(_) => Some(ErrorKind::DurationUnresolved),
            WorkerError::InvalidTimeline(_) => Some(ErrorKind::InvalidTimeline),
            WorkerError::CompositionFailed(_) => Some(ErrorKind::CompositionFailure),
            WorkerError::Cancelled(_) => Some(ErrorKind::Cancelled),
            WorkerError::Store(_) | WorkerError::Io(_) => Some(ErrorKind::ExternalEngineFailure),
            WorkerError::JobNotFound(_)
            | WorkerError::PhaseInProgress(_)
            | WorkerError::TimelineNotReady(_)
            | WorkerError::Transition(_)
            | WorkerError::ConfigError(_) => None,
        }
    }
}

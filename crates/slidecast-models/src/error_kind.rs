//! Error taxonomy surfaced through job status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Classification of the error that failed a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An external engine did not answer within its timeout
    ExternalEngineTimeout,
    /// An external engine exited non-zero or returned malformed output
    ExternalEngineFailure,
    /// The engine's circuit breaker rejected the call
    BreakerOpen,
    /// No duration strategy produced a usable value
    DurationUnresolved,
    /// The transcoder exited non-zero
    CompositionFailure,
    /// Zero bullets, or a correction produced a negative or unordered window
    InvalidTimeline,
    /// The job was cancelled at a phase boundary
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExternalEngineTimeout => "external_engine_timeout",
            ErrorKind::ExternalEngineFailure => "external_engine_failure",
            ErrorKind::BreakerOpen => "breaker_open",
            ErrorKind::DurationUnresolved => "duration_unresolved",
            ErrorKind::CompositionFailure => "composition_failure",
            ErrorKind::InvalidTimeline => "invalid_timeline",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether the same input can succeed on a later attempt.
    ///
    /// Duration and timeline errors are properties of the input and repeat
    /// on every retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ErrorKind::DurationUnresolved | ErrorKind::InvalidTimeline)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

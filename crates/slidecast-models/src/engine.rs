//! External engine kinds and circuit breaker snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of external engine. Circuit breakers are kept per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    AudioExtraction,
    FrameAnalysis,
    Transcription,
    Summarization,
    SlideRendering,
    Transcoder,
}

impl EngineKind {
    pub const ALL: [EngineKind; 6] = [
        EngineKind::AudioExtraction,
        EngineKind::FrameAnalysis,
        EngineKind::Transcription,
        EngineKind::Summarization,
        EngineKind::SlideRendering,
        EngineKind::Transcoder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::AudioExtraction => "audio_extraction",
            EngineKind::FrameAnalysis => "frame_analysis",
            EngineKind::Transcription => "transcription",
            EngineKind::Summarization => "summarization",
            EngineKind::SlideRendering => "slide_rendering",
            EngineKind::Transcoder => "transcoder",
        }
    }

    /// Upper-case name used for environment variable prefixes.
    pub fn env_name(&self) -> &'static str {
        match self {
            EngineKind::AudioExtraction => "AUDIO",
            EngineKind::FrameAnalysis => "FRAME",
            EngineKind::Transcription => "TRANSCRIBE",
            EngineKind::Summarization => "SUMMARIZE",
            EngineKind::SlideRendering => "SLIDES",
            EngineKind::Transcoder => "TRANSCODE",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// One trial call permitted
    HalfOpen,
}

impl BreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "closed",
            BreakerStatus::Open => "open",
            BreakerStatus::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of one engine kind's breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CircuitBreakerState {
    pub kind: EngineKind,
    pub state: BreakerStatus,
    pub consecutive_failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

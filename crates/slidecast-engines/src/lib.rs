//! External engines for the Slidecast pipeline.
//!
//! This crate provides:
//! - Narrow async traits for every external collaborator
//! - An HTTP client for the ML engine service (transcription, frame
//!   analysis, summarization)
//! - ffmpeg/ffprobe-backed implementations of the local tools
//! - Per-kind circuit breakers and the process-wide registry

pub mod breaker;
pub mod error;
pub mod ffmpeg;
pub mod http;
pub mod metrics;
pub mod traits;

pub use breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker};
pub use error::{EngineError, EngineResult, GuardError};
pub use ffmpeg::{
    FfmpegAudioExtractor, FfmpegFrameSampler, FfmpegSlideRenderer, FfmpegTranscoder,
    FfprobeDurationProbe,
};
pub use http::{EngineClientConfig, HttpEngineClient};
pub use traits::{
    AudioExtractor, DurationProbe, FrameAnalysisEngine, FrameSampler, SlideRenderer,
    SummarizationEngine, SummaryItem, TranscriptionEngine, Transcoder,
};

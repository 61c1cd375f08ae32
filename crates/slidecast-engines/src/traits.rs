//! Narrow interfaces to the external engines the pipeline depends on.
//!
//! Each trait is one kind of collaborator; the worker wraps every call in
//! the circuit breaker for that kind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use slidecast_media::OverlayDirective;
use slidecast_models::{AudioArtifact, AudioSegment, CropAnalysis};

use crate::error::EngineResult;

/// A candidate highlight returned by summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub text: String,
    /// Relative importance; higher is more important
    pub importance: f64,
}

impl SummaryItem {
    pub fn new(text: impl Into<String>, importance: f64) -> Self {
        Self {
            text: text.into(),
            importance,
        }
    }
}

/// Splits a source video's audio into transcribable segments.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(
        &self,
        source: &Path,
        out_dir: &Path,
        total_duration: f64,
    ) -> EngineResult<AudioArtifact>;
}

/// Pulls still frames out of a source video.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    async fn sample(&self, source: &Path, out_dir: &Path, duration: f64) -> EngineResult<Vec<PathBuf>>;
}

/// Locates the subject in a set of frames.
#[async_trait]
pub trait FrameAnalysisEngine: Send + Sync {
    async fn analyze(&self, frames: &[PathBuf]) -> EngineResult<CropAnalysis>;
}

/// Speech to text for one audio segment.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, segment: &AudioSegment) -> EngineResult<String>;
}

/// Turns a transcript into ordered candidate highlights.
#[async_trait]
pub trait SummarizationEngine: Send + Sync {
    async fn summarize(&self, transcript: &str) -> EngineResult<Vec<SummaryItem>>;
}

/// Renders one bullet's text to an image at `output`.
#[async_trait]
pub trait SlideRenderer: Send + Sync {
    async fn render(&self, text: &str, output: &Path) -> EngineResult<PathBuf>;
}

/// Burns overlay directives into the source video.
///
/// A non-zero exit of the underlying process is an error; the returned path
/// is only meaningful on success.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        source: &Path,
        directives: &[OverlayDirective],
        output: &Path,
    ) -> EngineResult<PathBuf>;
}

/// Decodes the source to measure its real duration in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe_duration(&self, source: &Path) -> EngineResult<f64>;
}

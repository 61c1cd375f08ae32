//! Phase 1 extraction results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::NormalizedRect;

/// One contiguous audio segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioSegment {
    /// 0-based position in the source
    pub index: u32,
    /// Segment file
    pub path: String,
    /// Start offset in the source (seconds)
    pub start: f64,
    /// End offset in the source (seconds)
    pub end: f64,
}

impl AudioSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Audio extracted from the source video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioArtifact {
    /// Directory holding the segment files; `None` for the fallback artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Ordered segments
    pub segments: Vec<AudioSegment>,
}

impl AudioArtifact {
    /// Placeholder used when audio extraction failed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Subject crop region found by frame/face analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CropAnalysis {
    pub crop: NormalizedRect,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl CropAnalysis {
    pub fn new(crop: NormalizedRect, confidence: f64) -> Self {
        Self {
            crop,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Centered crop with zero confidence, used when video analysis failed.
    pub fn fallback() -> Self {
        Self::new(NormalizedRect::centered(), 0.0)
    }
}

/// Aggregate status of phase 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Both branches produced real output
    Ok,
    /// One branch fell back to its default
    Degraded,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Ok => "ok",
            AnalysisStatus::Degraded => "degraded",
        }
    }
}

/// Phase 1 branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Audio,
    Video,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Audio => "audio",
            Branch::Video => "video",
        }
    }
}

/// Aggregated output of phase 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Phase1Result {
    pub audio: AudioArtifact,
    pub video: CropAnalysis,
    pub status: AnalysisStatus,
    /// Branches that fell back to defaults
    #[serde(default)]
    pub degraded_branches: Vec<Branch>,
    /// Why each degraded branch failed, in the same order
    #[serde(default)]
    pub degraded_reasons: Vec<String>,
    pub audio_elapsed_ms: u64,
    pub video_elapsed_ms: u64,
}

impl Phase1Result {
    pub fn is_degraded(&self) -> bool {
        self.status == AnalysisStatus::Degraded
    }
}

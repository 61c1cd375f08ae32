//! Bullets and timelines.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A timed textual highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bullet {
    /// Stable position in the presentation (0-based)
    pub ordinal: u32,
    pub text: String,
    /// Importance assigned by summarization (padding sentences get 0)
    pub importance: f64,
    /// Window start in seconds
    pub scheduled_start: f64,
    /// Window end in seconds
    pub scheduled_end: f64,
    /// Rendered slide image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_path: Option<String>,
}

impl Bullet {
    pub fn new(ordinal: u32, text: impl Into<String>, importance: f64) -> Self {
        Self {
            ordinal,
            text: text.into(),
            importance,
            scheduled_start: 0.0,
            scheduled_end: 0.0,
            slide_path: None,
        }
    }

    /// Set the scheduled window.
    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.scheduled_start = start;
        self.scheduled_end = end;
        self
    }

    pub fn window_len(&self) -> f64 {
        self.scheduled_end - self.scheduled_start
    }
}

/// How far a timeline has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStage {
    /// Spaced over an estimated duration in phase 2
    Provisional,
    /// Spaced over the authoritative duration in phase 3
    Corrected,
}

/// Where a duration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    /// Decode-based probe of the media stream
    Probe,
    /// Metadata recorded at upload
    UploadMetadata,
    /// Configured fallback
    Default,
}

impl DurationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationSource::Probe => "probe",
            DurationSource::UploadMetadata => "upload_metadata",
            DurationSource::Default => "default",
        }
    }
}

impl std::fmt::Display for DurationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered bullets with time windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    /// Bullets sorted by ordinal
    pub bullets: Vec<Bullet>,
    /// Total duration the windows are spaced over (seconds)
    pub total_duration: f64,
    pub stage: TimelineStage,
    /// Source of `total_duration`
    pub duration_source: DurationSource,
}

impl Timeline {
    /// Build a provisional timeline; bullets are sorted by ordinal.
    pub fn provisional(mut bullets: Vec<Bullet>, total_duration: f64, duration_source: DurationSource) -> Self {
        bullets.sort_by_key(|b| b.ordinal);
        Self {
            bullets,
            total_duration,
            stage: TimelineStage::Provisional,
            duration_source,
        }
    }

    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    pub fn is_corrected(&self) -> bool {
        self.stage == TimelineStage::Corrected
    }

    /// Bullet visible at time `t`, using half-open windows.
    pub fn bullet_at(&self, t: f64) -> Option<&Bullet> {
        self.bullets
            .iter()
            .find(|b| t >= b.scheduled_start && t < b.scheduled_end)
    }

    /// Check that no two windows overlap and every window lies within the
    /// total duration.
    pub fn windows_are_ordered(&self) -> bool {
        let within = self.bullets.iter().all(|b| {
            b.scheduled_start >= 0.0
                && b.scheduled_start <= b.scheduled_end
                && b.scheduled_end <= self.total_duration
        });
        let sequential = self
            .bullets
            .windows(2)
            .all(|w| w[0].ordinal < w[1].ordinal && w[0].scheduled_end <= w[1].scheduled_start);
        within && sequential
    }
}

//! Job record definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{ErrorKind, JobState, Phase, Phase1Result, Timeline};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata recorded when the video was uploaded.
///
/// Values come from the client or the upload handler and are not verified;
/// the reported duration in particular is frequently wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadMetadata {
    /// Reported duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Reported width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Reported height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Original file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl UploadMetadata {
    /// Metadata carrying only a reported duration.
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs: Some(duration_secs),
            ..Default::default()
        }
    }

    /// Reported duration if it is usable (positive and finite).
    pub fn usable_duration(&self) -> Option<f64> {
        self.duration_secs.filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Kind of artifact produced by a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Extracted audio (directory of segments)
    Audio,
    /// Full transcript text
    Transcript,
    /// Rendered slide image
    Slide,
    /// Final composed video
    Video,
}

/// Reference to an artifact produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    /// Filesystem path or storage key
    pub location: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

/// Timing metrics for a single phase run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl PhaseTiming {
    /// Start timing a phase now.
    pub fn start(phase: Phase) -> Self {
        Self {
            phase,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    /// Close the timing window.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
        self.duration_ms = Some((at - self.started_at).num_milliseconds());
    }

    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// Error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: ErrorKind,
    /// Human-readable summary
    pub message: String,
    /// Phase that was running when the error occurred
    pub phase: Phase,
    pub occurred_at: DateTime<Utc>,
}

impl JobError {
    pub fn new(kind: ErrorKind, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phase,
            occurred_at: Utc::now(),
        }
    }
}

/// A presentation job.
///
/// Mutated only by the pipeline orchestrator, through [`crate::JobStateMachine`]
/// for every state change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Path to the uploaded source video
    pub source_path: String,

    /// Metadata recorded at upload time
    #[serde(default)]
    pub upload_metadata: UploadMetadata,

    /// Current state
    #[serde(default)]
    pub state: JobState,

    /// Phase currently executing, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_phase: Option<Phase>,

    /// Phase during which the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,

    /// Last error (set when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,

    /// Per-phase timing, one entry per phase run (retries append)
    #[serde(default)]
    pub timings: Vec<PhaseTiming>,

    /// Artifacts produced so far
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,

    /// Phase 1 aggregate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase1: Option<Phase1Result>,

    /// Timeline produced by phase 2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisional_timeline: Option<Timeline>,

    /// Timeline corrected against the authoritative duration in phase 3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_timeline: Option<Timeline>,

    /// Number of explicit phase retries
    #[serde(default)]
    pub retry_count: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly uploaded job.
    pub fn new(source_path: impl Into<String>, upload_metadata: UploadMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_path: source_path.into(),
            upload_metadata,
            state: JobState::Uploaded,
            active_phase: None,
            failed_phase: None,
            last_error: None,
            timings: Vec::new(),
            artifacts: Vec::new(),
            phase1: None,
            provisional_timeline: None,
            final_timeline: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Use a specific job ID.
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Most recent timing entry for a phase.
    pub fn timing(&self, phase: Phase) -> Option<&PhaseTiming> {
        self.timings.iter().rev().find(|t| t.phase == phase)
    }

    pub(crate) fn timing_mut(&mut self, phase: Phase) -> Option<&mut PhaseTiming> {
        self.timings.iter_mut().rev().find(|t| t.phase == phase)
    }

    /// First artifact of a given kind.
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

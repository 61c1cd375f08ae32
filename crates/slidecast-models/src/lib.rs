//! Shared data models for the Slidecast pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, phases and the job state machine
//! - Phase 1 extraction results (audio segments, subject crop)
//! - Bullets and timelines
//! - Engine kinds and circuit breaker snapshots
//! - The error taxonomy surfaced through status queries

pub mod analysis;
pub mod engine;
pub mod error_kind;
pub mod job;
pub mod job_state;
pub mod rect;
pub mod timeline;

// Re-export common types
pub use analysis::{AnalysisStatus, AudioArtifact, AudioSegment, Branch, CropAnalysis, Phase1Result};
pub use engine::{BreakerStatus, CircuitBreakerState, EngineKind};
pub use error_kind::ErrorKind;
pub use job::{ArtifactKind, ArtifactRef, Job, JobError, JobId, PhaseTiming, UploadMetadata};
pub use job_state::{JobState, JobStateMachine, JobStatusView, Phase, Transition, TransitionError};
pub use rect::NormalizedRect;
pub use timeline::{Bullet, DurationSource, Timeline, TimelineStage};

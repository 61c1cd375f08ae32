//! Slidecast pipeline worker.
//!
//! This crate provides:
//! - The pipeline orchestrator (the only writer of job records)
//! - Phase 1 parallel extraction with degraded fallbacks
//! - Phase 2 transcript, highlight selection and slide rendering
//! - Phase 3 duration resolution, timeline correction and composition
//! - Structured job logging and pipeline metrics

pub mod composition;
pub mod config;
pub mod content;
pub mod engine_set;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod metrics;
pub mod orchestrator;

pub use composition::{CompositionEngine, DurationResolver, PreparedComposition, ResolvedDuration};
pub use config::{OverlayLayout, WorkerConfig};
pub use content::{ContentPipeline, ContentSettings};
pub use engine_set::EngineSet;
pub use error::{WorkerError, WorkerResult};
pub use extraction::ParallelAgentOrchestrator;
pub use logging::JobLogger;
pub use orchestrator::PipelineOrchestrator;

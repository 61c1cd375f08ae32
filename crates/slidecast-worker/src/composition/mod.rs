//! Phase 3: duration resolution, timeline correction and transcoding.
//!
//! Composition is split in two steps so the orchestrator can persist the
//! corrected timeline before the transcoder runs:
//! [`CompositionEngine::prepare`] resolves the duration, corrects the
//! timeline and builds the overlay directives; [`CompositionEngine::transcode`]
//! hands them to the transcoder in one call.

pub mod corrector;
pub mod directives;
pub mod duration;

use std::path::PathBuf;

use slidecast_engines::{BreakerRegistry, GuardError, Transcoder};
use slidecast_media::OverlayDirective;
use slidecast_models::{CropAnalysis, EngineKind, Job, Timeline};

use crate::config::OverlayLayout;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub use corrector::{assign_windows, correct_timeline};
pub use directives::{build_directives, panel_rect};
pub use duration::{
    DefaultStrategy, DurationResolver, DurationStrategy, MetadataStrategy, ProbeStrategy,
    ResolvedDuration,
};

/// Everything the transcoder needs for one job.
#[derive(Debug, Clone)]
pub struct PreparedComposition {
    pub timeline: Timeline,
    pub directives: Vec<OverlayDirective>,
    pub output: PathBuf,
}

pub struct CompositionEngine<'a> {
    pub resolver: &'a DurationResolver,
    pub layout: &'a OverlayLayout,
    pub transcoder: &'a dyn Transcoder,
    pub breakers: &'a BreakerRegistry,
}

impl CompositionEngine<'_> {
    /// Resolve the duration, correct the provisional timeline and build the
    /// overlay directives.
    pub async fn prepare(
        &self,
        job: &Job,
        output: PathBuf,
        logger: &JobLogger,
    ) -> WorkerResult<PreparedComposition> {
        let provisional = job
            .provisional_timeline
            .as_ref()
            .ok_or_else(|| WorkerError::invalid_timeline("no provisional timeline"))?;

        let duration = self.resolver.resolve(job).await?;
        logger.log_progress(&format!(
            "resolved duration {:.3}s from {}",
            duration.seconds, duration.source
        ));

        let timeline = correct_timeline(provisional, duration)?;

        let crop = job
            .phase1
            .as_ref()
            .map(|p| p.video)
            .unwrap_or_else(CropAnalysis::fallback);
        let directives = build_directives(&timeline, &crop, self.layout);
        logger.log_progress(&format!(
            "{} bullets, {} overlay directives",
            timeline.len(),
            directives.len()
        ));

        Ok(PreparedComposition {
            timeline,
            directives,
            output,
        })
    }

    /// Run the transcoder. Any failure of the transcoder itself, including a
    /// non-zero exit, is a composition failure.
    pub async fn transcode(&self, job: &Job, prepared: &PreparedComposition) -> WorkerResult<PathBuf> {
        let source = PathBuf::from(&job.source_path);
        let breaker = self.breakers.get(EngineKind::Transcoder);
        breaker
            .call(
                self.transcoder
                    .transcode(&source, &prepared.directives, &prepared.output),
            )
            .await
            .map_err(|e| match e {
                GuardError::Inner(inner) => WorkerError::composition_failed(inner.to_string()),
                other => WorkerError::from_guard(EngineKind::Transcoder, other),
            })
    }
}

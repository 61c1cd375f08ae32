//! Pipeline orchestrator.
//!
//! The orchestrator is the only writer of job records. Every state change
//! goes through [`JobStateMachine`]; phase runners only compute results.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, Instrument};

use slidecast_models::{
    ArtifactKind, ArtifactRef, CircuitBreakerState, EngineKind, ErrorKind, Job, JobError, JobId, JobState,
    JobStateMachine, JobStatusView, Phase, Timeline, TransitionError,
};
use slidecast_engines::BreakerRegistry;
use slidecast_store::JobStore;

use crate::composition::{CompositionEngine, DurationResolver};
use crate::config::WorkerConfig;
use crate::content::{ContentPipeline, ContentSettings};
use crate::engine_set::EngineSet;
use crate::error::{WorkerError, WorkerResult};
use crate::extraction::ParallelAgentOrchestrator;
use crate::logging::JobLogger;
use crate::metrics;

/// Drives jobs through the three phases.
pub struct PipelineOrchestrator {
    store: Arc<dyn JobStore>,
    engines: EngineSet,
    breakers: BreakerRegistry,
    config: Arc<WorkerConfig>,
    resolver: DurationResolver,
    active: Mutex<HashSet<JobId>>,
    cancelled: Mutex<HashSet<JobId>>,
}

/// Marks a job as owned by one runner until dropped.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl PipelineOrchestrator {
    pub fn new(config: WorkerConfig, store: Arc<dyn JobStore>, engines: EngineSet) -> Self {
        let breakers = BreakerRegistry::new(|kind| config.breaker(kind));
        Self::with_breakers(config, store, engines, breakers)
    }

    /// Use an existing breaker registry, shared with other orchestrators in
    /// the process.
    pub fn with_breakers(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        engines: EngineSet,
        breakers: BreakerRegistry,
    ) -> Self {
        let resolver = DurationResolver::standard(
            engines.probe.clone(),
            config.probe_timeout,
            config.default_duration,
            config.divergence_tolerance,
        );
        Self {
            store,
            engines,
            breakers,
            config: Arc::new(config),
            resolver,
            active: Mutex::new(HashSet::new()),
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Store a freshly uploaded job.
    pub async fn submit(&self, job: Job) -> WorkerResult<JobId> {
        info!(job_id = %job.id, source = %job.source_path, "Job submitted");
        self.store.set(&job).await?;
        Ok(job.id)
    }

    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<JobStatusView> {
        let job = self.load(job_id).await?;
        Ok(JobStateMachine::status(&job))
    }

    /// The corrected timeline, available once phase 3 has corrected it.
    pub async fn get_timeline(&self, job_id: &JobId) -> WorkerResult<Timeline> {
        let job = self.load(job_id).await?;
        job.final_timeline
            .ok_or_else(|| WorkerError::TimelineNotReady(job_id.to_string()))
    }

    pub fn breaker_states(&self) -> Vec<CircuitBreakerState> {
        self.breakers.snapshot()
    }

    /// Request cancellation. The job fails with `Cancelled` before its next
    /// phase starts; a running phase is not interrupted.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<JobStatusView> {
        let job = self.load(job_id).await?;
        if !job.state.is_terminal() {
            info!(job_id = %job_id, state = %job.state, "Cancellation requested");
            self.cancelled
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(job_id.clone());
        }
        Ok(JobStateMachine::status(&job))
    }

    /// Run one phase of a job.
    ///
    /// Starting a phase whose completion state the job already holds is a
    /// no-op. A job that failed in `phase` is retried.
    pub async fn start_phase(&self, job_id: &JobId, phase: Phase) -> WorkerResult<JobStatusView> {
        let _guard = self.claim(job_id)?;
        self.run_phase(job_id, phase).await
    }

    /// Run every remaining phase in order. A failed job is left as is.
    pub async fn run_pipeline(&self, job_id: &JobId) -> WorkerResult<JobStatusView> {
        let _guard = self.claim(job_id)?;
        loop {
            let job = self.load(job_id).await?;
            let next = match job.state {
                JobState::Uploaded | JobState::Processing => Phase::Extraction,
                JobState::Phase1Complete => Phase::ContentAnalysis,
                JobState::Phase2Complete => Phase::Composition,
                JobState::Completed | JobState::Failed => return Ok(JobStateMachine::status(&job)),
            };
            self.run_phase(job_id, next).await?;
        }
    }

    fn claim(&self, job_id: &JobId) -> WorkerResult<ActiveGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(job_id.clone()) {
            return Err(WorkerError::PhaseInProgress(job_id.to_string()));
        }
        Ok(ActiveGuard {
            active: &self.active,
            job_id: job_id.clone(),
        })
    }

    fn take_cancellation(&self, job_id: &JobId) -> bool {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
    }

    async fn load(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))
    }

    async fn run_phase(&self, job_id: &JobId, phase: Phase) -> WorkerResult<JobStatusView> {
        let mut job = self.load(job_id).await?;

        if job.state == phase.completion_state() {
            return Ok(JobStateMachine::status(&job));
        }

        // A pending cancel is only charged to a phase the job could start.
        JobStateMachine::check_start(&job, phase).map_err(|e| start_error(phase, e))?;

        if self.take_cancellation(job_id) && !job.state.is_terminal() {
            let err = WorkerError::Cancelled(job_id.to_string());
            return Err(self.fail_job(&mut job, phase, err).await);
        }

        if job.state == JobState::Failed && job.failed_phase == Some(phase) {
            JobStateMachine::begin_retry(&mut job, phase)?;
            info!(job_id = %job_id, phase = phase.as_str(), retry = job.retry_count, "Retrying phase");
        }

        JobStateMachine::begin_phase(&mut job, phase).map_err(|e| start_error(phase, e))?;
        self.store.set(&job).await?;

        let logger = JobLogger::new(&job.id, phase);
        logger.log_start(&job.source_path);

        let outcome = self
            .execute(&mut job, phase, &logger)
            .instrument(logger.create_span())
            .await;

        match outcome {
            Ok(artifact) => {
                JobStateMachine::complete_phase(&mut job, phase, artifact)?;
                if let Some(ms) = job.timing(phase).and_then(|t| t.duration_ms) {
                    metrics::record_phase_duration(phase, "success", ms);
                }
                if job.state == JobState::Completed {
                    metrics::record_job_completed();
                }
                self.store.set(&job).await?;
                logger.log_completion(job.state.as_str());
                Ok(JobStateMachine::status(&job))
            }
            Err(e) => Err(self.fail_job(&mut job, phase, e).await),
        }
    }

    /// Record `err` on the job and hand it back to the caller.
    async fn fail_job(&self, job: &mut Job, phase: Phase, err: WorkerError) -> WorkerError {
        let kind = err.kind().unwrap_or(ErrorKind::ExternalEngineFailure);
        let logger = JobLogger::new(&job.id, phase);
        logger.log_error(&err.to_string());

        if let Err(e) = JobStateMachine::fail(job, JobError::new(kind, phase, err.to_string())) {
            return WorkerError::Transition(e);
        }
        metrics::record_phase_failure(phase, kind);
        if let Some(ms) = job.timing(phase).and_then(|t| t.duration_ms) {
            metrics::record_phase_duration(phase, "failure", ms);
        }
        if let Err(e) = self.store.set(job).await {
            logger.log_error(&format!("failed to persist job failure: {}", e));
        }
        err
    }

    async fn execute(
        &self,
        job: &mut Job,
        phase: Phase,
        logger: &JobLogger,
    ) -> WorkerResult<Option<ArtifactRef>> {
        let job_dir = self.config.job_dir(job.id.as_str());
        match phase {
            Phase::Extraction => self.extract(job, &job_dir, logger).await,
            Phase::ContentAnalysis => self.analyze_content(job, &job_dir, logger).await,
            Phase::Composition => self.compose(job, logger).await,
        }
    }

    async fn extract(&self, job: &mut Job, job_dir: &Path, logger: &JobLogger) -> WorkerResult<Option<ArtifactRef>> {
        let estimate = self.resolver.resolve(job).await?;
        let runner = ParallelAgentOrchestrator::from_engines(&self.engines, self.breakers.clone());
        let result = runner
            .run(Path::new(&job.source_path), job_dir, estimate.seconds, logger)
            .await?;

        let artifact = result
            .audio
            .location
            .clone()
            .map(|location| ArtifactRef::new(ArtifactKind::Audio, location));
        job.phase1 = Some(result);
        Ok(artifact)
    }

    async fn analyze_content(
        &self,
        job: &mut Job,
        job_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<Option<ArtifactRef>> {
        if job.phase1.as_ref().is_some_and(|p| p.audio.is_empty()) {
            self.recover_audio(job, job_dir, logger).await?;
        }

        let phase1 = job
            .phase1
            .as_ref()
            .ok_or_else(|| WorkerError::invalid_timeline("phase 1 left no result"))?;

        let settings = ContentSettings {
            min_bullets: self.config.min_bullets,
            max_bullets: self.config.max_bullets,
            default_duration: self.config.default_duration,
        };
        let pipeline = ContentPipeline::from_engines(&self.engines, self.breakers.clone(), settings);
        let output = pipeline
            .run(phase1, &job.upload_metadata, job_dir, logger)
            .await?;

        tokio::fs::create_dir_all(job_dir).await?;
        let transcript_path = job_dir.join("transcript.txt");
        tokio::fs::write(&transcript_path, &output.transcript).await?;

        for bullet in &output.timeline.bullets {
            if let Some(slide) = &bullet.slide_path {
                job.artifacts.push(ArtifactRef::new(ArtifactKind::Slide, slide.clone()));
            }
        }
        job.provisional_timeline = Some(output.timeline);

        Ok(Some(ArtifactRef::new(
            ArtifactKind::Transcript,
            transcript_path.to_string_lossy(),
        )))
    }

    /// Extract audio again for a job whose phase 1 audio branch degraded.
    ///
    /// An extraction failure keeps its engine error kind, so a later retry
    /// of phase 2 tries once more.
    async fn recover_audio(&self, job: &mut Job, job_dir: &Path, logger: &JobLogger) -> WorkerResult<()> {
        logger.log_warning("phase 1 audio degraded, extracting audio again");
        let estimate = self.resolver.resolve(job).await?;
        let audio = self
            .breakers
            .get(EngineKind::AudioExtraction)
            .call(self.engines.audio.extract(
                Path::new(&job.source_path),
                &job_dir.join("audio"),
                estimate.seconds,
            ))
            .await
            .map_err(|e| WorkerError::from_guard(EngineKind::AudioExtraction, e))?;

        logger.log_progress(&format!("recovered {} audio segments", audio.segments.len()));
        if let Some(phase1) = job.phase1.as_mut() {
            phase1.audio = audio;
        }
        Ok(())
    }

    async fn compose(&self, job: &mut Job, logger: &JobLogger) -> WorkerResult<Option<ArtifactRef>> {
        let engine = CompositionEngine {
            resolver: &self.resolver,
            layout: &self.config.layout,
            transcoder: self.engines.transcoder.as_ref(),
            breakers: &self.breakers,
        };

        let prepared = engine
            .prepare(job, self.config.output_path(job.id.as_str()), logger)
            .await?;

        // Persist the corrected timeline before the transcoder can fail.
        job.final_timeline = Some(prepared.timeline.clone());
        job.touch();
        self.store.set(job).await?;

        let output = engine.transcode(job, &prepared).await?;
        logger.log_progress(&format!("wrote {}", output.display()));
        Ok(Some(ArtifactRef::new(ArtifactKind::Video, output.to_string_lossy())))
    }
}

/// Report a phase started from the wrong state as an out-of-order move to
/// its completion state.
fn start_error(phase: Phase, err: TransitionError) -> WorkerError {
    match err {
        TransitionError::PhaseNotReady { state, .. } => {
            WorkerError::Transition(TransitionError::OutOfOrderTransition {
                from: state,
                to: phase.completion_state(),
            })
        }
        other => WorkerError::Transition(other),
    }
}

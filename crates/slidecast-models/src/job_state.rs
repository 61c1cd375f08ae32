//! Job state machine.
//!
//! Every state change of a [`Job`] goes through [`JobStateMachine`]. The
//! forward path is a fixed transition table; `failed` is reachable from any
//! non-terminal state and left only through an explicit retry of the phase
//! that failed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{ArtifactRef, Job, JobError, JobId, PhaseTiming};

/// Job processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Source uploaded, nothing run yet
    #[default]
    Uploaded,
    /// Phase 1 (extraction) running
    Processing,
    /// Phase 1 done
    Phase1Complete,
    /// Phase 2 done
    Phase2Complete,
    /// Composed video produced
    Completed,
    /// A phase failed
    Failed,
}

impl JobState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Uploaded => "uploaded",
            JobState::Processing => "processing",
            JobState::Phase1Complete => "phase1_complete",
            JobState::Phase2Complete => "phase2_complete",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Phase 1: audio extraction and video analysis
    Extraction,
    /// Phase 2: transcription, summarization, provisional timeline
    ContentAnalysis,
    /// Phase 3: duration resolution, timeline correction, transcoding
    Composition,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Extraction, Phase::ContentAnalysis, Phase::Composition];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extraction => "extraction",
            Phase::ContentAnalysis => "content_analysis",
            Phase::Composition => "composition",
        }
    }

    /// 1-based phase number.
    pub fn number(&self) -> u8 {
        match self {
            Phase::Extraction => 1,
            Phase::ContentAnalysis => 2,
            Phase::Composition => 3,
        }
    }

    /// State a job must be in for this phase to start.
    pub fn prerequisite_state(&self) -> JobState {
        match self {
            Phase::Extraction => JobState::Uploaded,
            Phase::ContentAnalysis => JobState::Phase1Complete,
            Phase::Composition => JobState::Phase2Complete,
        }
    }

    /// State a job is in once this phase has completed.
    pub fn completion_state(&self) -> JobState {
        match self {
            Phase::Extraction => JobState::Phase1Complete,
            Phase::ContentAnalysis => JobState::Phase2Complete,
            Phase::Composition => JobState::Completed,
        }
    }

    /// Phase that follows this one.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Extraction => Some(Phase::ContentAnalysis),
            Phase::ContentAnalysis => Some(Phase::Composition),
            Phase::Composition => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a state machine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job moved from one state to another
    Applied { from: JobState, to: JobState },
    /// The job was already in the requested state; nothing changed
    Unchanged(JobState),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Rejected state machine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Out of order transition: {from} -> {to}")]
    OutOfOrderTransition { from: JobState, to: JobState },

    #[error("Job is in terminal state {0}")]
    Terminal(JobState),

    #[error("Phase {phase} cannot start from state {state}")]
    PhaseNotReady { phase: Phase, state: JobState },

    #[error("Phase {phase} cannot be retried from state {state}")]
    RetryNotAllowed { phase: Phase, state: JobState },
}

/// Forward transition table. `Failed` edges are handled separately.
const TRANSITIONS: &[(JobState, JobState)] = &[
    (JobState::Uploaded, JobState::Processing),
    (JobState::Processing, JobState::Phase1Complete),
    (JobState::Phase1Complete, JobState::Phase2Complete),
    (JobState::Phase2Complete, JobState::Completed),
];

/// Status snapshot returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_phase: Option<Phase>,
    /// Last state reached without error
    pub last_good_state: JobState,
    pub timings: Vec<PhaseTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Whether re-running the failed phase can be expected to help
    pub retry_safe: bool,
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Stateless transition logic over [`Job`] records.
pub struct JobStateMachine;

impl JobStateMachine {
    /// Immediate successor of a state on the forward path.
    pub fn successor(state: JobState) -> Option<JobState> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == state)
            .map(|(_, to)| *to)
    }

    /// Move a job to `target`, which must be the immediate successor of its
    /// current state. Re-applying the current state is a no-op.
    pub fn advance(
        job: &mut Job,
        target: JobState,
        result: Option<ArtifactRef>,
    ) -> Result<Transition, TransitionError> {
        if job.state == target {
            return Ok(Transition::Unchanged(target));
        }
        if job.state.is_terminal() {
            return Err(TransitionError::Terminal(job.state));
        }
        if Self::successor(job.state) != Some(target) {
            return Err(TransitionError::OutOfOrderTransition {
                from: job.state,
                to: target,
            });
        }

        let from = job.state;
        job.state = target;

        if let Some(phase) = Phase::ALL.iter().find(|p| p.completion_state() == target) {
            let now = Utc::now();
            if let Some(timing) = job.timing_mut(*phase).filter(|t| t.is_open()) {
                timing.finish(now);
            }
            if job.active_phase == Some(*phase) {
                job.active_phase = None;
            }
        }

        if let Some(artifact) = result {
            job.artifacts.push(artifact);
        }
        job.touch();

        Ok(Transition::Applied { from, to: target })
    }

    /// Mark a phase as started.
    ///
    /// The job must sit in the phase's prerequisite state. Starting phase 1
    /// also moves the job to `processing`; a repeated start of a phase 1 run
    /// that is already `processing` restarts its timing.
    pub fn begin_phase(job: &mut Job, phase: Phase) -> Result<Transition, TransitionError> {
        let transition = match (phase, job.state) {
            (Phase::Extraction, JobState::Uploaded) => {
                Self::advance(job, JobState::Processing, None)?
            }
            (Phase::Extraction, JobState::Processing) => Transition::Unchanged(JobState::Processing),
            (_, state) if state == phase.prerequisite_state() => Transition::Unchanged(state),
            (_, state) if state.is_terminal() => return Err(TransitionError::Terminal(state)),
            (_, state) => return Err(TransitionError::PhaseNotReady { phase, state }),
        };

        job.active_phase = Some(phase);
        job.timings.push(PhaseTiming::start(phase));
        job.touch();
        Ok(transition)
    }

    /// Whether `phase` may run now: from its prerequisite state, or as a
    /// retry of the phase the job failed in. Does not touch the job.
    pub fn check_start(job: &Job, phase: Phase) -> Result<(), TransitionError> {
        match (phase, job.state) {
            (_, JobState::Failed) if job.failed_phase == Some(phase) => Ok(()),
            (Phase::Extraction, JobState::Processing) => Ok(()),
            (_, state) if state == phase.prerequisite_state() => Ok(()),
            (_, state) if state.is_terminal() => Err(TransitionError::Terminal(state)),
            (_, state) => Err(TransitionError::PhaseNotReady { phase, state }),
        }
    }

    /// Mark a phase as completed, advancing to its completion state.
    pub fn complete_phase(
        job: &mut Job,
        phase: Phase,
        result: Option<ArtifactRef>,
    ) -> Result<Transition, TransitionError> {
        Self::advance(job, phase.completion_state(), result)
    }

    /// Move a job to `failed`. Repeated failure notifications are no-ops.
    pub fn fail(job: &mut Job, error: JobError) -> Result<Transition, TransitionError> {
        match job.state {
            JobState::Failed => return Ok(Transition::Unchanged(JobState::Failed)),
            JobState::Completed => return Err(TransitionError::Terminal(JobState::Completed)),
            _ => {}
        }

        let from = job.state;
        let phase = error.phase;
        if let Some(timing) = job.timing_mut(phase).filter(|t| t.is_open()) {
            timing.finish(error.occurred_at);
        }

        job.state = JobState::Failed;
        job.active_phase = None;
        job.failed_phase = Some(phase);
        job.last_error = Some(error);
        job.touch();

        Ok(Transition::Applied {
            from,
            to: JobState::Failed,
        })
    }

    /// Re-open a failed job for another run of the phase that failed.
    ///
    /// The job returns to the phase's prerequisite state; earlier phases'
    /// results are kept.
    pub fn begin_retry(job: &mut Job, phase: Phase) -> Result<Transition, TransitionError> {
        if job.state != JobState::Failed || job.failed_phase != Some(phase) {
            return Err(TransitionError::RetryNotAllowed {
                phase,
                state: job.state,
            });
        }

        let to = phase.prerequisite_state();
        job.state = to;
        job.failed_phase = None;
        job.last_error = None;
        job.retry_count += 1;
        job.touch();

        Ok(Transition::Applied {
            from: JobState::Failed,
            to,
        })
    }

    /// Build the status view for a job.
    pub fn status(job: &Job) -> JobStatusView {
        let last_good_state = match (job.state, job.failed_phase) {
            (JobState::Failed, Some(phase)) => phase.prerequisite_state(),
            (JobState::Failed, None) => JobState::Uploaded,
            (JobState::Processing, _) => JobState::Uploaded,
            (state, _) => state,
        };

        let retry_safe = job.state == JobState::Failed
            && job
                .last_error
                .as_ref()
                .map(|e| e.kind.is_transient())
                .unwrap_or(false);

        JobStatusView {
            job_id: job.id.clone(),
            state: job.state,
            active_phase: job.active_phase,
            last_good_state,
            timings: job.timings.clone(),
            error: job.last_error.clone(),
            retry_safe,
            retry_count: job.retry_count,
            updated_at: job.updated_at,
        }
    }
}

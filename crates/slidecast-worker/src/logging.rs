//! Per-phase job logging.
//!
//! Every event a phase emits carries `job_id`, `phase` and `phase_number`,
//! so a single job can be followed through JSON logs with one filter.

use std::time::Instant;

use tracing::{error, info, warn, Span};

use slidecast_models::{JobId, Phase};

/// Emits one event at `$level` with the logger's job fields attached.
macro_rules! job_event {
    ($level:ident, $logger:expr, $($rest:tt)+) => {
        $level!(
            job_id = %$logger.job_id,
            phase = $logger.phase.as_str(),
            phase_number = $logger.phase.number(),
            $($rest)+
        )
    };
}

/// Logger for one run of one phase of a job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    phase: Phase,
    started: Instant,
}

impl JobLogger {
    pub fn new(job_id: &JobId, phase: Phase) -> Self {
        Self {
            job_id: job_id.to_string(),
            phase,
            started: Instant::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn log_start(&self, source: &str) {
        job_event!(info, self, source, "Starting {}", self.phase);
    }

    pub fn log_progress(&self, message: &str) {
        job_event!(info, self, "{}", message);
    }

    /// A degraded result that lets the phase continue.
    pub fn log_warning(&self, message: &str) {
        job_event!(warn, self, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        job_event!(error, self, elapsed_ms = self.elapsed_ms(), "{} failed: {}", self.phase, message);
    }

    pub fn log_completion(&self, state: &str) {
        job_event!(info, self, elapsed_ms = self.elapsed_ms(), state, "{} finished", self.phase);
    }

    /// Span that phase work runs inside.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "phase",
            job_id = %self.job_id,
            phase = self.phase.as_str(),
        )
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

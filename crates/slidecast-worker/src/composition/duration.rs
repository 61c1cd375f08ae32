//! Authoritative duration resolution.
//!
//! Strategies are tried in order until one yields a positive, finite value.
//! The standard chain is decode probe, then upload metadata, then a fixed
//! default; a successful probe is never overridden by metadata.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use slidecast_engines::DurationProbe;
use slidecast_models::{DurationSource, Job};

use crate::error::{WorkerError, WorkerResult};

/// One way of learning a job's duration.
#[async_trait]
pub trait DurationStrategy: Send + Sync {
    fn source(&self) -> DurationSource;

    /// Duration in seconds, or `None` when this strategy cannot tell.
    async fn resolve(&self, job: &Job) -> Option<f64>;
}

/// Decode-based probe of the source stream.
pub struct ProbeStrategy {
    probe: Arc<dyn DurationProbe>,
    timeout: Duration,
}

impl ProbeStrategy {
    pub fn new(probe: Arc<dyn DurationProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }
}

#[async_trait]
impl DurationStrategy for ProbeStrategy {
    fn source(&self) -> DurationSource {
        DurationSource::Probe
    }

    async fn resolve(&self, job: &Job) -> Option<f64> {
        let source = Path::new(&job.source_path);
        match tokio::time::timeout(self.timeout, self.probe.probe_duration(source)).await {
            Ok(Ok(duration)) => Some(duration),
            Ok(Err(e)) => {
                warn!(job_id = %job.id, "Duration probe failed: {}", e);
                None
            }
            Err(_) => {
                warn!(job_id = %job.id, "Duration probe timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

/// Duration reported at upload.
pub struct MetadataStrategy;

#[async_trait]
impl DurationStrategy for MetadataStrategy {
    fn source(&self) -> DurationSource {
        DurationSource::UploadMetadata
    }

    async fn resolve(&self, job: &Job) -> Option<f64> {
        job.upload_metadata.usable_duration()
    }
}

/// Configured fallback duration.
pub struct DefaultStrategy(pub f64);

#[async_trait]
impl DurationStrategy for DefaultStrategy {
    fn source(&self) -> DurationSource {
        DurationSource::Default
    }

    async fn resolve(&self, _job: &Job) -> Option<f64> {
        Some(self.0)
    }
}

/// A duration and the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDuration {
    pub seconds: f64,
    pub source: DurationSource,
}

/// Ordered list of duration strategies.
pub struct DurationResolver {
    strategies: Vec<Box<dyn DurationStrategy>>,
    divergence_tolerance: f64,
}

impl DurationResolver {
    pub fn new(strategies: Vec<Box<dyn DurationStrategy>>, divergence_tolerance: f64) -> Self {
        Self {
            strategies,
            divergence_tolerance,
        }
    }

    /// Probe, then upload metadata, then `default_duration`.
    pub fn standard(
        probe: Arc<dyn DurationProbe>,
        probe_timeout: Duration,
        default_duration: f64,
        divergence_tolerance: f64,
    ) -> Self {
        Self::new(
            vec![
                Box::new(ProbeStrategy::new(probe, probe_timeout)),
                Box::new(MetadataStrategy),
                Box::new(DefaultStrategy(default_duration)),
            ],
            divergence_tolerance,
        )
    }

    pub async fn resolve(&self, job: &Job) -> WorkerResult<ResolvedDuration> {
        for strategy in &self.strategies {
            let Some(seconds) = strategy.resolve(job).await else {
                continue;
            };
            if !(seconds.is_finite() && seconds > 0.0) {
                debug!(job_id = %job.id, source = %strategy.source(), seconds, "Ignoring unusable duration");
                continue;
            }

            let resolved = ResolvedDuration {
                seconds,
                source: strategy.source(),
            };
            self.check_divergence(job, resolved);
            return Ok(resolved);
        }

        Err(WorkerError::duration_unresolved(format!(
            "no strategy produced a duration for {}",
            job.source_path
        )))
    }

    fn check_divergence(&self, job: &Job, resolved: ResolvedDuration) {
        if resolved.source == DurationSource::UploadMetadata {
            return;
        }
        if let Some(reported) = job.upload_metadata.usable_duration() {
            let delta = (resolved.seconds - reported).abs();
            if delta > self.divergence_tolerance {
                warn!(
                    job_id = %job.id,
                    resolved = resolved.seconds,
                    source = %resolved.source,
                    reported,
                    delta,
                    "Upload metadata disagrees with resolved duration"
                );
            }
        }
    }
}

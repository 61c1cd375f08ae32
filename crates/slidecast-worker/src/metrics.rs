//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use slidecast_models::{Branch, ErrorKind, Phase};

/// Metric name constants for consistency.
pub mod names {
    /// Phase run time in seconds by phase and outcome.
    pub const PHASE_DURATION_SECONDS: &str = "slidecast_phase_duration_seconds";

    /// Failed phase runs by phase and error kind.
    pub const PHASE_FAILURES_TOTAL: &str = "slidecast_phase_failures_total";

    /// Phase 1 runs that fell back on a branch, by branch.
    pub const PHASE1_DEGRADED_TOTAL: &str = "slidecast_phase1_degraded_total";

    /// Jobs that produced a composed video.
    pub const JOBS_COMPLETED_TOTAL: &str = "slidecast_jobs_completed_total";
}

/// Serve Prometheus metrics on `addr`.
pub fn init_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

pub fn record_phase_duration(phase: Phase, outcome: &'static str, duration_ms: i64) {
    histogram!(
        names::PHASE_DURATION_SECONDS,
        "phase" => phase.as_str(),
        "outcome" => outcome
    )
    .record(duration_ms.max(0) as f64 / 1000.0);
}

pub fn record_phase_failure(phase: Phase, kind: ErrorKind) {
    counter!(
        names::PHASE_FAILURES_TOTAL,
        "phase" => phase.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_phase1_degraded(branch: Branch) {
    counter!(names::PHASE1_DEGRADED_TOTAL, "branch" => branch.as_str()).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

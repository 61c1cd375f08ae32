//! Engine-level metrics.

use metrics::{counter, histogram};

use slidecast_models::{BreakerStatus, EngineKind};

/// Metric name constants for consistency.
pub mod names {
    /// Breaker state changes by engine kind and target state.
    pub const BREAKER_TRANSITIONS_TOTAL: &str = "slidecast_breaker_transitions_total";

    /// HTTP engine requests by endpoint and status.
    pub const ENGINE_REQUESTS_TOTAL: &str = "slidecast_engine_requests_total";

    /// HTTP engine request latency in seconds by endpoint.
    pub const ENGINE_LATENCY_SECONDS: &str = "slidecast_engine_latency_seconds";
}

/// Record a breaker moving into `to`.
pub fn record_breaker_transition(kind: EngineKind, to: BreakerStatus) {
    counter!(
        names::BREAKER_TRANSITIONS_TOTAL,
        "kind" => kind.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record a completed HTTP engine request.
pub fn record_request(endpoint: &str, status: u16, latency_ms: f64) {
    counter!(
        names::ENGINE_REQUESTS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::ENGINE_LATENCY_SECONDS,
        "endpoint" => endpoint.to_string()
    )
    .record(latency_ms / 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::BREAKER_TRANSITIONS_TOTAL.starts_with("slidecast_"));
        assert!(names::ENGINE_LATENCY_SECONDS.ends_with("_seconds"));
    }
}

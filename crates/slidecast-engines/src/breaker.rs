//! Circuit breaker for external engine calls.
//!
//! One breaker exists per [`EngineKind`] and is shared by every job in the
//! process. After `failure_threshold` consecutive failures the breaker opens
//! and rejects calls without running them. Once `cooldown` has passed it
//! lets exactly one trial call through; the trial's outcome closes or
//! reopens it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};

use slidecast_models::{BreakerStatus, CircuitBreakerState, EngineKind};

use crate::error::GuardError;
use crate::metrics;

/// Tuning for one engine kind's breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time the breaker stays open before allowing a trial
    pub cooldown: Duration,
    /// Per-call timeout; exceeding it counts as a failure
    pub call_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    status: BreakerStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Failure guard for one engine kind.
#[derive(Debug)]
pub struct CircuitBreaker {
    kind: EngineKind,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(kind: EngineKind, settings: BreakerSettings) -> Self {
        Self {
            kind,
            settings,
            inner: Mutex::new(BreakerInner {
                status: BreakerStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
                opened_at_wall: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fut` under the breaker with the per-kind timeout.
    ///
    /// When the breaker is open the future is dropped without being polled.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().ok_or(GuardError::Open(self.kind))?;
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(Ok(value)) => {
                permit.succeed();
                Ok(value)
            }
            Ok(Err(e)) => {
                permit.fail();
                Err(GuardError::Inner(e))
            }
            Err(_) => {
                permit.fail();
                warn!(kind = %self.kind, timeout = ?self.settings.call_timeout, "Engine call timed out");
                Err(GuardError::Timeout {
                    kind: self.kind,
                    timeout: self.settings.call_timeout,
                })
            }
        }
    }

    fn acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        match inner.status {
            BreakerStatus::Closed => Some(Permit::new(self, false)),
            BreakerStatus::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.settings.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return None;
                }
                self.transition(&mut inner, BreakerStatus::HalfOpen);
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
            BreakerStatus::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.status {
            BreakerStatus::Closed => inner.consecutive_failures = 0,
            BreakerStatus::HalfOpen if trial => {
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                inner.opened_at = None;
                inner.opened_at_wall = None;
                self.transition(&mut inner, BreakerStatus::Closed);
            }
            // A call admitted before the breaker opened
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.status {
            BreakerStatus::Closed => {
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    self.open(&mut inner);
                }
            }
            BreakerStatus::HalfOpen if trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner);
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.opened_at = Some(Instant::now());
        inner.opened_at_wall = Some(Utc::now());
        self.transition(inner, BreakerStatus::Open);
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerStatus) {
        let from = inner.status;
        inner.status = to;
        if from == to {
            return;
        }
        match to {
            BreakerStatus::Open => warn!(
                kind = %self.kind,
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            ),
            _ => info!(
                kind = %self.kind,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state changed"
            ),
        }
        metrics::record_breaker_transition(self.kind, to);
    }

    /// Current state, for status queries and monitoring.
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.lock();
        CircuitBreakerState {
            kind: self.kind,
            state: inner.status,
            consecutive_failure_count: inner.consecutive_failures,
            opened_at: inner.opened_at_wall,
        }
    }
}

/// Admission for one call. A trial permit dropped without an outcome (the
/// caller's future was cancelled) counts as a failed trial.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.record_failure(true);
        }
    }
}

/// Process-wide set of breakers, one per engine kind.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    breakers: Arc<Vec<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Build a breaker for every engine kind using `settings_for`.
    pub fn new(settings_for: impl Fn(EngineKind) -> BreakerSettings) -> Self {
        let breakers = EngineKind::ALL
            .iter()
            .map(|&kind| CircuitBreaker::new(kind, settings_for(kind)))
            .collect();
        Self {
            breakers: Arc::new(breakers),
        }
    }

    /// The breaker for `kind`.
    pub fn get(&self, kind: EngineKind) -> &CircuitBreaker {
        // Built from `EngineKind::ALL`, which lists kinds in declaration order
        &self.breakers[kind as usize]
    }

    pub fn snapshot(&self) -> Vec<CircuitBreakerState> {
        self.breakers.iter().map(CircuitBreaker::snapshot).collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(|_| BreakerSettings::default())
    }
}

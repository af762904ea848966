//! Observable wrapper: an optional decorator around [`DecisionPipeline`]
//! that counts outcomes and exposes metrics/health without altering
//! decisions.

use crate::algorithms::Decision;
use crate::error::ThrottlerError;
use crate::pipeline::DecisionPipeline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EntityCounters {
    pub requests_total: u64,
    pub requests_denied: u64,
}

/// Configuration for the pull-model alert evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    /// Fraction in `[0, 1]`; an `error_rate` above this trips the alert.
    pub max_error_rate: f64,
    /// Consecutive Store failures before the circuit breaker opens.
    pub consecutive_failure_threshold: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.5,
            consecutive_failure_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Snapshot returned by [`Observable::evaluate_alerts`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertStatus {
    pub circuit: CircuitState,
    pub error_rate: f64,
    pub consecutive_backend_failures: u32,
}

/// Decorates a [`DecisionPipeline`] with request/denial/health counters and
/// a pull-model alert evaluation. Reads only the `Decision`/`Result`
/// returned by the wrapped pipeline; never touches Store state directly.
pub struct Observable {
    inner: DecisionPipeline,
    per_entity: RwLock<HashMap<(String, String), EntityCounters>>,
    requests_total: AtomicU64,
    requests_denied: AtomicU64,
    backend_errors: AtomicU64,
    consecutive_backend_failures: AtomicU64,
    health_checks: AtomicU64,
    total_duration_nanos: AtomicU64,
    thresholds: AlertThresholds,
}

impl Observable {
    pub fn new(inner: DecisionPipeline) -> Self {
        Self::with_thresholds(inner, AlertThresholds::default())
    }

    pub fn with_thresholds(inner: DecisionPipeline, thresholds: AlertThresholds) -> Self {
        Self {
            inner,
            per_entity: RwLock::new(HashMap::new()),
            requests_total: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            consecutive_backend_failures: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
            thresholds,
        }
    }

    pub async fn check(&self, entity: &str, scope: &str, tier: &str, n: u64) -> Result<Decision, ThrottlerError> {
        let start = Instant::now();
        let result = self.inner.check(entity, scope, tier, n).await;
        self.record(entity, scope, start.elapsed(), &result);
        result
    }

    pub async fn allow(&self, entity: &str, scope: &str, tier: &str, n: u64) -> Result<bool, ThrottlerError> {
        Ok(self.check(entity, scope, tier, n).await?.allowed)
    }

    pub async fn reset(&self, entity: &str, scope: &str) -> Result<(), ThrottlerError> {
        self.inner.reset(entity, scope).await
    }

    pub async fn health(&self) -> Result<(), ThrottlerError> {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.health().await;
        self.note_backend_outcome(result.is_ok());
        result
    }

    fn record(&self, entity: &str, scope: &str, elapsed: Duration, result: &Result<Decision, ThrottlerError>) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);

        match result {
            Ok(decision) => {
                self.note_backend_outcome(true);
                if !decision.allowed {
                    self.requests_denied.fetch_add(1, Ordering::Relaxed);
                }
                self.bump_entity_counters(entity, scope, decision.allowed);
            }
            Err(err) => {
                if err.is_backend() {
                    self.backend_errors.fetch_add(1, Ordering::Relaxed);
                    self.note_backend_outcome(false);
                }
            }
        }
    }

    fn bump_entity_counters(&self, entity: &str, scope: &str, allowed: bool) {
        // A blocking write-lock acquisition here would be incorrect inside
        // an async context; `try_write` degrades to "skip this sample"
        // under contention rather than adding unbounded await points to the
        // hot path. Counters are advisory, not a correctness boundary.
        if let Ok(mut map) = self.per_entity.try_write() {
            let counters = map.entry((entity.to_string(), scope.to_string())).or_default();
            counters.requests_total += 1;
            if !allowed {
                counters.requests_denied += 1;
            }
        }
    }

    fn note_backend_outcome(&self, ok: bool) {
        if ok {
            self.consecutive_backend_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_backend_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn entity_counters(&self, entity: &str, scope: &str) -> EntityCounters {
        self.per_entity
            .read()
            .await
            .get(&(entity.to_string(), scope.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn requests_denied(&self) -> u64 {
        self.requests_denied.load(Ordering::Relaxed)
    }

    pub fn health_checks(&self) -> u64 {
        self.health_checks.load(Ordering::Relaxed)
    }

    pub fn mean_request_duration(&self) -> Duration {
        let total = self.requests_total.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed) / total)
    }

    /// Evaluates alert conditions on demand (pull model): an `error_rate`
    /// above the configured threshold, or the circuit breaker open after
    /// enough consecutive Store failures.
    pub fn evaluate_alerts(&self) -> AlertStatus {
        let total = self.requests_total.load(Ordering::Relaxed).max(1);
        let errors = self.backend_errors.load(Ordering::Relaxed);
        let error_rate = errors as f64 / total as f64;
        let consecutive = self.consecutive_backend_failures.load(Ordering::Relaxed) as u32;

        let circuit = if consecutive >= self.thresholds.consecutive_failure_threshold
            || error_rate > self.thresholds.max_error_rate
        {
            tracing::warn!(
                consecutive_failures = consecutive,
                error_rate = error_rate,
                "circuit breaker open"
            );
            CircuitState::Open
        } else {
            CircuitState::Closed
        };

        AlertStatus {
            circuit,
            error_rate,
            consecutive_backend_failures: consecutive,
        }
    }
}

/// Shared ownership helper for callers that hand an `Observable` to
/// multiple tasks; cloning `Arc<Observable>` is the intended usage pattern
/// rather than cloning `Observable` itself (its counters are not `Clone`).
pub type SharedObservable = Arc<Observable>;

//! Decision pipeline: ties policy resolution, storage key computation, the
//! configured algorithm, and the Store together into `check`/`allow`/
//! `reset`/`health`.

use crate::algorithms::{AlgorithmKind, Decision, RateLimitAlgorithm};
use crate::clock::Clock;
use crate::error::ThrottlerError;
use crate::policy::PolicyTable;
use crate::store::{guarded, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Upper bound on compare-and-set retries for one admission before giving
/// up and surfacing a `BackendError`. Bounds how long sustained contention
/// on a single key can hold up a caller instead of retrying forever.
const MAX_CAS_ATTEMPTS: u32 = 8;

/// Ties a [`PolicyTable`], a [`Store`], the configured algorithm, and a
/// [`Clock`] together into the admission surface.
pub struct DecisionPipeline {
    policy: PolicyTable,
    store: Arc<dyn Store>,
    algorithm: Arc<dyn RateLimitAlgorithm>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    operation_timeout: Duration,
}

impl DecisionPipeline {
    pub fn new(
        policy: PolicyTable,
        store: Arc<dyn Store>,
        algorithm: Arc<dyn RateLimitAlgorithm>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            store,
            algorithm,
            clock,
            key_prefix: key_prefix.into(),
            operation_timeout,
        }
    }

    fn storage_key(&self, entity: &str, scope: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.key_prefix,
            self.algorithm.kind().as_str(),
            entity,
            scope
        )
    }

    /// Resolves `(entity, scope, tier)` to a [`Decision`], admitting `n`
    /// units. Not cancellable; see [`Self::check_cancellable`].
    pub async fn check(&self, entity: &str, scope: &str, tier: &str, n: u64) -> Result<Decision, ThrottlerError> {
        self.check_cancellable(entity, scope, tier, n, None).await
    }

    /// As [`Self::check`], but races every Store operation against `cancel`
    /// and the configured `operation_timeout`. A cancelled admission yields
    /// `CancelledError` and leaves state either unmodified (in-memory) or
    /// in an unknown committed/uncommitted state (remote); callers must
    /// not retry blindly with a fresh `n`.
    ///
    /// The read-compute-write triple is serialized per key via
    /// `compare_and_set`, not a plain `get` followed by `set`: a bare
    /// read-modify-write would let two concurrent admissions against the
    /// same key both read the same prior state and each believe they won,
    /// losing one of the two updates. On a CAS conflict the whole triple is
    /// retried against the freshly-observed state, up to
    /// [`MAX_CAS_ATTEMPTS`] times.
    pub async fn check_cancellable(
        &self,
        entity: &str,
        scope: &str,
        tier: &str,
        n: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Decision, ThrottlerError> {
        let spec = self.policy.resolve(entity, scope, tier)?;
        let key = self.storage_key(entity, scope);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let prior = match guarded(self.store.get(&key), cancel, Some(self.operation_timeout)).await {
                Ok(bytes) => Some(bytes),
                Err(crate::store::StoreError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };

            let now = self.clock.monotonic_now();
            let wall_now = self.clock.wall_now();
            let (new_state, ttl, decision) =
                self.algorithm.admit(prior.as_deref(), now, wall_now, &spec, n)?;

            let swapped = guarded(
                self.store.compare_and_set(&key, prior.as_deref(), new_state, ttl),
                cancel,
                Some(self.operation_timeout),
            )
            .await
            .map_err(ThrottlerError::from)?;

            if swapped {
                return Ok(decision);
            }
            // Someone else won the race on this key; re-read and retry the
            // whole compute against the new prior state.
            warn!(key = %key, "compare-and-set conflict, retrying admission");
        }

        warn!(key = %key, attempts = MAX_CAS_ATTEMPTS, "exceeded compare-and-set attempts under contention");
        Err(ThrottlerError::backend(format!(
            "exceeded {MAX_CAS_ATTEMPTS} compare-and-set attempts for key {key:?} under contention"
        )))
    }

    /// `true` iff the admission was allowed. Convenience wrapper over
    /// [`Self::check`] for callers that don't need the full `Decision`.
    pub async fn allow(&self, entity: &str, scope: &str, tier: &str, n: u64) -> Result<bool, ThrottlerError> {
        Ok(self.check(entity, scope, tier, n).await?.allowed)
    }

    /// Deletes the stored key for `(entity, scope)`; the next admission
    /// starts fresh. A reset of an unknown key is a no-op success.
    pub async fn reset(&self, entity: &str, scope: &str) -> Result<(), ThrottlerError> {
        let key = self.storage_key(entity, scope);
        self.store.delete(&key).await.map_err(ThrottlerError::from)
    }

    /// Delegates to the Store's health probe.
    pub async fn health(&self) -> Result<(), ThrottlerError> {
        self.store.ping().await.map_err(ThrottlerError::from)
    }

    pub fn algorithm_kind(&self) -> AlgorithmKind {
        self.algorithm.kind()
    }
}

/// The canonical `Decision -> header` mapping: `X-RateLimit-Limit`,
/// `X-RateLimit-Remaining`, `X-RateLimit-Reset` (seconds since epoch),
/// `Retry-After` (seconds, ceiling). Producing this pair list is the in-scope
/// part of the documented wire shape; wiring it into any specific
/// framework's response type is a collaborator's job.
pub fn headers_for_decision(decision: &Decision) -> Vec<(&'static str, String)> {
    let reset_epoch_secs = decision
        .reset_time
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut headers = vec![
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", reset_epoch_secs.to_string()),
    ];

    if !decision.allowed {
        let retry_after_secs = decision.retry_after.as_secs()
            + u64::from(decision.retry_after.subsec_nanos() > 0);
        headers.push(("Retry-After", retry_after_secs.to_string()));
    }

    headers
}

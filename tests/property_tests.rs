//! Property-based tests for the two admission algorithms' invariants.
//!
//! Each algorithm is driven directly (not through a Store) with an
//! increasing time sequence, checking the invariants that must hold after
//! every single admission regardless of the arbitrary sequence of `n`s.

use proptest::prelude::*;
use std::time::{Duration, SystemTime};
use throttler::algorithms::sliding_window::SlidingWindowAlgorithm;
use throttler::algorithms::token_bucket::TokenBucketAlgorithm;
use throttler::limit_spec::LimitSpec;
use throttler::RateLimitAlgorithm;

fn arb_limit() -> impl Strategy<Value = u64> {
    1u64..200
}

fn arb_window_secs() -> impl Strategy<Value = u64> {
    1u64..3600
}

fn arb_n() -> impl Strategy<Value = u64> {
    1u64..10
}

/// Non-decreasing sequence of instants in nanoseconds, spread over a few
/// multiples of the window so both refill/eviction and saturation are
/// exercised.
fn arb_time_sequence(len: usize, window_secs: u64) -> impl Strategy<Value = Vec<Duration>> {
    let max_step_nanos = (window_secs.max(1) * 2_000_000_000 / len.max(1) as u64).max(1);
    prop::collection::vec(0u64..max_step_nanos, len).prop_map(move |deltas| {
        let mut t = Duration::from_secs(1_000);
        let mut out = Vec::with_capacity(deltas.len());
        for d in deltas {
            t += Duration::from_nanos(d);
            out.push(t);
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Invariant 1 + 2 (token bucket): remaining is never negative and
    /// stored tokens never exceed capacity after any admission.
    #[test]
    fn token_bucket_remaining_non_negative_and_tokens_bounded(
        limit in arb_limit(),
        window_secs in arb_window_secs(),
        times in arb_time_sequence(30, 30),
        amounts in prop::collection::vec(arb_n(), 30),
    ) {
        let spec = LimitSpec::new(limit, Duration::from_secs(window_secs)).unwrap();
        prop_assume!(spec.validate_for_token_bucket().is_ok());
        let algo = TokenBucketAlgorithm;
        let mut raw: Option<Vec<u8>> = None;

        for (now, n) in times.into_iter().zip(amounts) {
            let (bytes, _, decision) =
                algo.admit(raw.as_deref(), now, SystemTime::UNIX_EPOCH, &spec, n).unwrap();
            prop_assert!(decision.remaining <= decision.limit);
            let state: throttler::algorithms::token_bucket::BucketState =
                serde_json::from_slice(&bytes).unwrap();
            prop_assert!(state.tokens <= state.capacity as f64 + 1e-9);
            prop_assert!(state.tokens >= -1e-9);
            raw = Some(bytes);
        }
    }

    /// Invariant 1 + 3 (sliding window): remaining is never negative and
    /// the stored event count never exceeds the limit.
    #[test]
    fn sliding_window_remaining_non_negative_and_events_bounded(
        limit in arb_limit(),
        window_secs in arb_window_secs(),
        times in arb_time_sequence(30, 30),
        amounts in prop::collection::vec(arb_n(), 30),
    ) {
        let spec = LimitSpec::new(limit, Duration::from_secs(window_secs)).unwrap();
        let algo = SlidingWindowAlgorithm;
        let mut raw: Option<Vec<u8>> = None;

        for (now, n) in times.into_iter().zip(amounts) {
            let (bytes, _, decision) =
                algo.admit(raw.as_deref(), now, SystemTime::UNIX_EPOCH, &spec, n).unwrap();
            prop_assert!(decision.remaining <= decision.limit);
            let state: throttler::algorithms::sliding_window::WindowState =
                serde_json::from_slice(&bytes).unwrap();
            prop_assert!(state.events.len() as u64 <= state.limit);
            raw = Some(bytes);
        }
    }

    /// Invariant 5: sending exactly `limit + k` unit requests within a
    /// single instant yields exactly `limit` allowed and `k` denied for the
    /// sliding window (exact by construction - no time elapses between
    /// calls).
    #[test]
    fn sliding_window_exact_denial_threshold(
        limit in 1u64..50,
        extra in 1u64..20,
    ) {
        let spec = LimitSpec::new(limit, Duration::from_secs(60)).unwrap();
        let algo = SlidingWindowAlgorithm;
        let now = Duration::from_secs(1_000);
        let mut raw: Option<Vec<u8>> = None;
        let mut allowed_count = 0u64;
        let mut denied_count = 0u64;

        for _ in 0..(limit + extra) {
            let (bytes, _, decision) =
                algo.admit(raw.as_deref(), now, SystemTime::UNIX_EPOCH, &spec, 1).unwrap();
            if decision.allowed {
                allowed_count += 1;
            } else {
                denied_count += 1;
            }
            raw = Some(bytes);
        }

        prop_assert_eq!(allowed_count, limit);
        prop_assert_eq!(denied_count, extra);
    }

    /// Invariant 7: `n = 0` is always a `ConfigError` for both algorithms
    /// and never produces a state mutation (no bytes/ttl/decision are
    /// returned at all).
    #[test]
    fn zero_n_is_always_rejected(limit in arb_limit(), window_secs in arb_window_secs()) {
        let spec = LimitSpec::new(limit, Duration::from_secs(window_secs)).unwrap();
        prop_assert!(SlidingWindowAlgorithm
            .admit(None, Duration::ZERO, SystemTime::UNIX_EPOCH, &spec, 0)
            .is_err());
        if spec.validate_for_token_bucket().is_ok() {
            prop_assert!(TokenBucketAlgorithm
                .admit(None, Duration::ZERO, SystemTime::UNIX_EPOCH, &spec, 0)
                .is_err());
        }
    }
}

/// Invariant 4 (monotone reporting): within one sustained burst above the
/// limit, `retry_after` for successive denials must not increase except as
/// explained by refill: each denial here happens strictly later than the
/// last with no new capacity freed up, so `retry_after` must shrink toward
/// zero as `now` approaches the moment capacity reopens.
#[test]
fn token_bucket_retry_after_is_non_increasing_across_a_sustained_burst() {
    let spec = LimitSpec::new(5, Duration::from_secs(100)).unwrap();
    let algo = TokenBucketAlgorithm;

    let (bytes, _, fill) = algo
        .admit(None, Duration::from_secs(0), SystemTime::UNIX_EPOCH, &spec, 5)
        .unwrap();
    assert!(fill.allowed);

    let mut raw = bytes;
    let mut last_retry = Duration::MAX;
    for t in 1..6u64 {
        let (bytes, _, decision) = algo
            .admit(Some(&raw), Duration::from_secs(t), SystemTime::UNIX_EPOCH, &spec, 1)
            .unwrap();
        assert!(!decision.allowed, "capacity was just drained, every further unit denies");
        assert!(
            decision.retry_after <= last_retry,
            "retry_after must not increase across a sustained burst"
        );
        last_retry = decision.retry_after;
        raw = bytes;
    }
}

/// Same invariant for the sliding window: once saturated, repeated denials
/// at strictly later instants must report a non-increasing `retry_after` as
/// the oldest tracked event's expiry draws nearer.
#[test]
fn sliding_window_retry_after_is_non_increasing_across_a_sustained_burst() {
    let spec = LimitSpec::new(3, Duration::from_secs(100)).unwrap();
    let algo = SlidingWindowAlgorithm;

    let (bytes, _, fill) = algo
        .admit(None, Duration::from_secs(0), SystemTime::UNIX_EPOCH, &spec, 3)
        .unwrap();
    assert!(fill.allowed);

    let mut raw = bytes;
    let mut last_retry = Duration::MAX;
    for t in 1..6u64 {
        let (bytes, _, decision) = algo
            .admit(Some(&raw), Duration::from_secs(t), SystemTime::UNIX_EPOCH, &spec, 1)
            .unwrap();
        assert!(!decision.allowed);
        assert!(
            decision.retry_after <= last_retry,
            "retry_after must not increase across a sustained burst"
        );
        last_retry = decision.retry_after;
        raw = bytes;
    }
}

/// Invariant 8 (serializability): `K` concurrent single-unit admissions
/// against one key with `limit = L` and `K > L` must allow exactly `L`
/// (sliding window, via the in-memory Store's per-key atomicity). This
/// drives real OS threads rather than a proptest strategy since the
/// property under test is about concurrent execution, not input shape.
#[tokio::test]
async fn serializability_under_concurrent_admissions_sliding_window() {
    use std::sync::Arc;
    use throttler::clock::SystemClock;
    use throttler::pipeline::DecisionPipeline;
    use throttler::policy::PolicyTable;
    use throttler::store::MemoryStore;
    use throttler::Store;

    let limit = 20u64;
    let concurrency = 50u64;

    let policy = PolicyTable::builder()
        .global_default(LimitSpec::new(limit, Duration::from_secs(60)).unwrap())
        .build()
        .unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::without_reaper());
    let algorithm: Arc<dyn RateLimitAlgorithm> = Arc::new(SlidingWindowAlgorithm);
    let pipeline = Arc::new(DecisionPipeline::new(
        policy,
        store,
        algorithm,
        Arc::new(SystemClock),
        "rl",
        Duration::from_secs(5),
    ));

    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.check("k", "global", "free", 1).await.unwrap().allowed
        }));
    }

    let mut allowed = 0u64;
    for h in handles {
        if h.await.unwrap() {
            allowed += 1;
        }
    }

    assert_eq!(allowed, limit, "no lost updates: exactly `limit` admissions must win");
}

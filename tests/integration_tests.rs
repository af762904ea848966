//! End-to-end tests against the public admission surface, covering the
//! seed scenarios and the pipeline/entity/config wiring together.

use std::sync::Arc;
use std::time::Duration;
use throttler::algorithms::sliding_window::SlidingWindowAlgorithm;
use throttler::algorithms::token_bucket::TokenBucketAlgorithm;
use throttler::clock::{Clock, FrozenClock};
use throttler::entity::{resolve_entity, resolve_scope, resolve_tier, EntityStrategy, RequestContext};
use throttler::limit_spec::parse_limit_spec;
use throttler::pipeline::{headers_for_decision, DecisionPipeline};
use throttler::policy::PolicyTable;
use throttler::store::MemoryStore;
use throttler::{RateLimitAlgorithm, Store};

fn sliding_window_pipeline(limit: &str, clock: Arc<dyn Clock>) -> DecisionPipeline {
    let policy = PolicyTable::builder()
        .global_default(parse_limit_spec(limit).unwrap())
        .build()
        .unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::without_reaper());
    let algorithm: Arc<dyn RateLimitAlgorithm> = Arc::new(SlidingWindowAlgorithm);
    DecisionPipeline::new(policy, store, algorithm, clock, "rl", Duration::from_secs(5))
}

fn token_bucket_pipeline(limit: &str, clock: Arc<dyn Clock>) -> DecisionPipeline {
    let policy = PolicyTable::builder()
        .global_default(parse_limit_spec(limit).unwrap())
        .build()
        .unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::without_reaper());
    let algorithm: Arc<dyn RateLimitAlgorithm> = Arc::new(TokenBucketAlgorithm);
    DecisionPipeline::new(policy, store, algorithm, clock, "rl", Duration::from_secs(5))
}

#[tokio::test]
async fn s1_sliding_window_four_sequential_unit_admissions() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("3/minute", clock);

    let mut decisions = Vec::new();
    for _ in 0..4 {
        decisions.push(pipeline.check("k", "global", "free", 1).await.unwrap());
    }

    assert!(decisions[0].allowed && decisions[1].allowed && decisions[2].allowed);
    assert!(!decisions[3].allowed);
    assert_eq!(decisions[3].remaining, 0);
    assert!(decisions[3].retry_after > Duration::ZERO);
    assert_eq!(decisions[3].used, 3);
}

#[tokio::test]
async fn s2_token_bucket_bulk_then_overflow() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = token_bucket_pipeline("10/s", clock);

    let d1 = pipeline.check("k", "global", "free", 5).await.unwrap();
    assert!(d1.allowed);
    assert_eq!(d1.remaining, 5);

    let d2 = pipeline.check("k", "global", "free", 6).await.unwrap();
    assert!(!d2.allowed);
    assert_eq!(d2.remaining, 5, "state must be unchanged by a denial");
}

#[tokio::test]
async fn s3_sliding_window_admits_again_after_full_window_elapses() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("5/2s", clock.clone());

    for _ in 0..5 {
        assert!(pipeline.check("k", "global", "free", 1).await.unwrap().allowed);
    }

    clock.advance(Duration::from_millis(2500));
    let sixth = pipeline.check("k", "global", "free", 1).await.unwrap();
    assert!(sixth.allowed);
    assert!(sixth.remaining >= 4);
}

#[tokio::test]
async fn s4_fifty_concurrent_admissions_under_a_limit_of_one_hundred_all_allowed() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = Arc::new(sliding_window_pipeline("100/minute", clock));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.check("k", "global", "free", 1).await.unwrap().allowed
        }));
    }

    let mut allowed_count = 0;
    for h in handles {
        if h.await.unwrap() {
            allowed_count += 1;
        }
    }
    assert_eq!(allowed_count, 50);
}

#[tokio::test]
async fn s5_zero_n_is_config_error_and_does_not_mutate_state() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("3/minute", clock);

    assert!(pipeline.check("k", "global", "free", 0).await.is_err());

    // State must be untouched: a full-limit admission still succeeds.
    for _ in 0..3 {
        assert!(pipeline.check("k", "global", "free", 1).await.unwrap().allowed);
    }
    assert!(!pipeline.check("k", "global", "free", 1).await.unwrap().allowed);
}

#[tokio::test]
async fn s6_reset_of_unknown_key_is_a_no_op_success() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("3/minute", clock);
    assert!(pipeline.reset("never-seen", "global").await.is_ok());
}

#[tokio::test]
async fn entity_scope_tier_resolution_feeds_directly_into_the_pipeline() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("2/minute", clock);

    let ctx = RequestContext::new("203.0.113.9:51000", "/search").with_tier_claim("premium");
    let entity = resolve_entity(&EntityStrategy::IpAddress, &ctx);
    let scope = resolve_scope(&ctx);
    let tier = resolve_tier(&ctx);

    assert_eq!(entity, "203.0.113.9");
    assert_eq!(scope, "/search");
    assert_eq!(tier, "premium");

    assert!(pipeline.check(&entity, &scope, &tier, 1).await.unwrap().allowed);
    assert!(pipeline.check(&entity, &scope, &tier, 1).await.unwrap().allowed);
    assert!(!pipeline.check(&entity, &scope, &tier, 1).await.unwrap().allowed);
}

#[tokio::test]
async fn headers_for_decision_maps_the_canonical_header_names() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("1/minute", clock);

    let allowed = pipeline.check("k", "global", "free", 1).await.unwrap();
    let headers = headers_for_decision(&allowed);
    assert!(headers.iter().any(|(name, _)| *name == "X-RateLimit-Limit"));
    assert!(headers.iter().any(|(name, _)| *name == "X-RateLimit-Remaining"));
    assert!(headers.iter().any(|(name, _)| *name == "X-RateLimit-Reset"));

    let denied = pipeline.check("k", "global", "free", 1).await.unwrap();
    let denied_headers = headers_for_decision(&denied);
    assert!(denied_headers.iter().any(|(name, _)| *name == "Retry-After"));
}

#[tokio::test]
async fn independent_entities_never_interfere() {
    let clock = Arc::new(FrozenClock::default());
    let pipeline = sliding_window_pipeline("1/minute", clock);

    assert!(pipeline.check("alice", "global", "free", 1).await.unwrap().allowed);
    assert!(pipeline.check("bob", "global", "free", 1).await.unwrap().allowed);
    assert!(!pipeline.check("alice", "global", "free", 1).await.unwrap().allowed);
    assert!(!pipeline.check("bob", "global", "free", 1).await.unwrap().allowed);
}

#[tokio::test]
async fn policy_table_resolves_tier_override_ahead_of_scope_default() {
    use throttler::LimitSpec;

    let clock = Arc::new(FrozenClock::default());
    let policy = PolicyTable::builder()
        .global_default(LimitSpec::new(1, Duration::from_secs(60)).unwrap())
        .scope_default("search", LimitSpec::new(2, Duration::from_secs(60)).unwrap())
        .tier_limit("premium", "search", LimitSpec::new(5, Duration::from_secs(60)).unwrap())
        .build()
        .unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::without_reaper());
    let algorithm: Arc<dyn RateLimitAlgorithm> = Arc::new(SlidingWindowAlgorithm);
    let pipeline = DecisionPipeline::new(policy, store, algorithm, clock, "rl", Duration::from_secs(5));

    for _ in 0..5 {
        assert!(pipeline.check("k", "search", "premium", 1).await.unwrap().allowed);
    }
    assert!(!pipeline.check("k", "search", "premium", 1).await.unwrap().allowed);
}

//! # Admission algorithms
//!
//! The decision engine's two pluggable algorithms: [`token_bucket`] and
//! [`sliding_window`]. Both are pure functions over `(prior state, now,
//! limit, window, n) -> (new state, Decision)`. The Store read/write
//! bracketing them lives in [`crate::pipeline`], not here, so the
//! algorithms themselves are trivially unit-testable without a backend.

pub mod sliding_window;
pub mod token_bucket;

pub use sliding_window::{SlidingWindowAlgorithm, WindowState};
pub use token_bucket::{BucketState, TokenBucketAlgorithm};

use crate::limit_spec::LimitSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which admission algorithm a [`crate::config::Config`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    TokenBucket,
    SlidingWindow,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::TokenBucket => "token_bucket",
            AlgorithmKind::SlidingWindow => "sliding_window",
        }
    }
}

impl Default for AlgorithmKind {
    fn default() -> Self {
        AlgorithmKind::SlidingWindow
    }
}

/// The result of one admission query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Non-negative; for denied queries this is the usable budget that
    /// remains, never negative.
    pub remaining: u64,
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub used: u64,
    /// Zero if allowed; otherwise a strictly positive lower bound on time
    /// until `n` units become available.
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
    /// Wall-clock instant at which capacity is guaranteed full again (token
    /// bucket) or the oldest tracked event falls out of the window
    /// (sliding window).
    pub reset_time: std::time::SystemTime,
    pub algorithm: AlgorithmKind,
}

/// A snapshot of an algorithm's persisted state, reshaped into a typed
/// record for callers that want it. Not itself persisted;
/// each algorithm's own state struct is what's serialized to the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AlgorithmState {
    TokenBucket(BucketInfo),
    SlidingWindow(WindowInfo),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    pub tokens: f64,
    pub capacity: u64,
    pub refill_rate: f64,
    pub total_requests: u64,
    pub denied_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
    pub count: u64,
    pub limit: u64,
    pub total_requests: u64,
    pub denied_requests: u64,
}

/// Validates `n` the way both algorithms require: `n >= 1`, else
/// `ConfigError`: an explicit non-operation is invalid.
pub(crate) fn validate_n(n: u64) -> Result<(), crate::error::ThrottlerError> {
    if n == 0 {
        return Err(crate::error::ThrottlerError::config(
            "requested amount `n` must be >= 1; n=0 is not a valid admission",
        ));
    }
    Ok(())
}

/// Shared entry point: reads prior state from `raw` (`None` means absent),
/// invokes the algorithm, and returns the new serialized state alongside
/// the ttl to persist it with and the `Decision`.
pub trait RateLimitAlgorithm: Send + Sync {
    fn admit(
        &self,
        prior: Option<&[u8]>,
        now: Duration,
        wall_now: std::time::SystemTime,
        spec: &LimitSpec,
        n: u64,
    ) -> Result<(Vec<u8>, Duration, Decision), crate::error::ThrottlerError>;

    fn kind(&self) -> AlgorithmKind;
}

//! Token-bucket admission: a bucket holding up to `capacity` tokens,
//! refilled continuously at `refill_rate` tokens/second, drained by `n` on
//! every admitted request.

use super::{validate_n, AlgorithmKind, BucketInfo, Decision, RateLimitAlgorithm};
use crate::error::ThrottlerError;
use crate::limit_spec::LimitSpec;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Persisted bucket state (also the wire shape written to the [`crate::store::Store`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    pub capacity: u64,
    pub refill_rate: f64,
    /// Monotonic nanoseconds since an arbitrary epoch, matching the `Clock`
    /// the pipeline injects, never wall-clock, so NTP adjustments can't
    /// move tokens backward or forward. Serialized as `last_refill` to
    /// match the fixed wire schema.
    #[serde(rename = "last_refill")]
    pub last_refill_nanos: u64,
    pub total_requests: u64,
    pub denied_requests: u64,
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,
}

impl BucketState {
    fn fresh(spec: &LimitSpec, now: Duration) -> Self {
        BucketState {
            tokens: spec.count as f64,
            capacity: spec.count,
            refill_rate: spec.refill_rate(),
            last_refill_nanos: now.as_nanos() as u64,
            total_requests: 0,
            denied_requests: 0,
            window_duration: spec.window,
        }
    }

    fn last_refill(&self) -> Duration {
        Duration::from_nanos(self.last_refill_nanos)
    }

    /// Adds elapsed-time-scaled tokens, capped at `capacity`. Lazy: called
    /// at read time rather than by a background timer, so a bucket nobody
    /// touches costs nothing between requests.
    fn refill(&mut self, now: Duration) {
        if now <= self.last_refill() {
            return;
        }
        let elapsed = (now - self.last_refill()).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        self.last_refill_nanos = now.as_nanos() as u64;
    }

    pub fn info(&self) -> BucketInfo {
        BucketInfo {
            tokens: self.tokens,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            total_requests: self.total_requests,
            denied_requests: self.denied_requests,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucketAlgorithm;

impl RateLimitAlgorithm for TokenBucketAlgorithm {
    fn admit(
        &self,
        prior: Option<&[u8]>,
        now: Duration,
        wall_now: SystemTime,
        spec: &LimitSpec,
        n: u64,
    ) -> Result<(Vec<u8>, Duration, Decision), ThrottlerError> {
        validate_n(n)?;
        spec.validate_for_token_bucket()?;

        let mut state = match prior {
            Some(bytes) => serde_json::from_slice::<BucketState>(bytes)?,
            None => BucketState::fresh(spec, now),
        };

        // A live bucket's capacity/rate track whatever limit is configured
        // now, so an in-flight limit change takes effect on the next read
        // rather than requiring a key reset.
        state.capacity = spec.count;
        state.refill_rate = spec.refill_rate();
        state.window_duration = spec.window;

        state.refill(now);

        let allowed = state.tokens >= n as f64;
        if allowed {
            state.tokens -= n as f64;
            state.total_requests += n;
        } else {
            state.denied_requests += n;
        }

        let remaining = state.tokens.floor().max(0.0) as u64;

        let retry_after = if allowed {
            Duration::ZERO
        } else {
            let deficit = n as f64 - state.tokens;
            Duration::from_secs_f64((deficit / state.refill_rate).max(0.0))
        };

        // Time for the bucket to refill from its current level back to
        // full, reported as the reset horizon regardless of admission
        // outcome.
        let seconds_to_full = ((state.capacity as f64 - state.tokens) / state.refill_rate).max(0.0);
        let reset_time = wall_now + Duration::from_secs_f64(seconds_to_full);

        let decision = Decision {
            allowed,
            remaining,
            limit: state.capacity,
            window: state.window_duration,
            used: state.capacity.saturating_sub(remaining),
            retry_after,
            reset_time,
            algorithm: AlgorithmKind::TokenBucket,
        };

        // At least two windows of slack before the backend reclaims the
        // key, so a bucket that's gone briefly idle doesn't lose its
        // accumulated denial/total counters to TTL expiry.
        let ttl = (state.window_duration * 2).max(Duration::from_secs(60));

        let bytes = serde_json::to_vec(&state)?;
        Ok((bytes, ttl, decision))
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::TokenBucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(count: u64, window_secs: u64) -> LimitSpec {
        LimitSpec::new(count, Duration::from_secs(window_secs)).unwrap()
    }

    #[test]
    fn fresh_bucket_admits_up_to_capacity_then_denies() {
        let algo = TokenBucketAlgorithm;
        let spec = spec(5, 10);
        let mut raw: Option<Vec<u8>> = None;
        let now = Duration::from_secs(1_000);

        for _ in 0..5 {
            let (bytes, _, decision) =
                algo.admit(raw.as_deref(), now, SystemTime::UNIX_EPOCH, &spec, 1).unwrap();
            assert!(decision.allowed);
            raw = Some(bytes);
        }

        let (_, _, decision) =
            algo.admit(raw.as_deref(), now, SystemTime::UNIX_EPOCH, &spec, 1).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after > Duration::ZERO);
    }

    #[test]
    fn refill_restores_tokens_proportional_to_elapsed_time() {
        let algo = TokenBucketAlgorithm;
        let spec = spec(10, 10); // refill rate = 1 token/s
        let t0 = Duration::from_secs(0);
        let (bytes, _, d0) =
            algo.admit(None, t0, SystemTime::UNIX_EPOCH, &spec, 10).unwrap();
        assert!(d0.allowed);
        assert_eq!(d0.remaining, 0);

        let t1 = t0 + Duration::from_secs(5);
        let (_, _, d1) = algo.admit(Some(&bytes), t1, SystemTime::UNIX_EPOCH, &spec, 1).unwrap();
        assert!(d1.allowed);
        // ~5 tokens refilled, 1 consumed -> ~4 remaining.
        assert_eq!(d1.remaining, 4);
    }

    #[test]
    fn rejects_zero_n() {
        let algo = TokenBucketAlgorithm;
        let spec = spec(5, 10);
        let err = algo
            .admit(None, Duration::ZERO, SystemTime::UNIX_EPOCH, &spec, 0)
            .unwrap_err();
        assert!(matches!(err, ThrottlerError::ConfigError(_)));
    }

    #[test]
    fn tokens_never_exceed_capacity_after_long_idle() {
        let algo = TokenBucketAlgorithm;
        let spec = spec(3, 1); // refill rate = 3 tokens/s
        let (bytes, _, _) =
            algo.admit(None, Duration::from_secs(0), SystemTime::UNIX_EPOCH, &spec, 1).unwrap();
        let (bytes2, _, decision) = algo
            .admit(Some(&bytes), Duration::from_secs(10_000), SystemTime::UNIX_EPOCH, &spec, 0_u64.max(1))
            .unwrap();
        let _ = bytes2;
        assert!(decision.remaining <= decision.limit);
    }
}

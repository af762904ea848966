//! Exact-event sliding-window admission: every admitted unit's timestamp is
//! tracked individually, and an admission is allowed only if fewer than
//! `limit` timestamps fall within `[now - window, now]`. Exact, unlike a
//! fixed-bucket counter - no boundary burst where two adjacent buckets each
//! admit a full quota within one real window.

use super::{validate_n, AlgorithmKind, Decision, RateLimitAlgorithm, WindowInfo};
use crate::error::ThrottlerError;
use crate::limit_spec::LimitSpec;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Persisted window state. `events` holds one monotonic-nanosecond entry per
/// admitted unit (not per call - an `n`-unit admission appends `n` entries),
/// kept sorted so cleanup is a binary-search prefix trim. Field names are
/// serialized to match the fixed wire schema (`requests`/`window_nano`/
/// `last_cleanup`) while keeping more descriptive names on the Rust side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    #[serde(rename = "requests")]
    pub events: Vec<u64>,
    #[serde(rename = "window_nano")]
    pub window_nanos: u64,
    pub limit: u64,
    pub total_requests: u64,
    pub denied_requests: u64,
    #[serde(rename = "last_cleanup")]
    pub last_cleanup_nanos: u64,
}

impl WindowState {
    fn fresh(spec: &LimitSpec) -> Self {
        WindowState {
            events: Vec::new(),
            window_nanos: spec.window.as_nanos() as u64,
            limit: spec.count,
            total_requests: 0,
            denied_requests: 0,
            last_cleanup_nanos: 0,
        }
    }

    /// Drops every event older than `now - window`. `events` stays sorted
    /// because entries are only ever appended at the tail with
    /// non-decreasing timestamps, so the cutoff is a single `partition_point`
    /// binary search rather than a full scan.
    fn evict_expired(&mut self, now: Duration) {
        let cutoff = now.as_nanos().saturating_sub(self.window_nanos as u128) as u64;
        let split = self.events.partition_point(|&ts| ts < cutoff);
        self.events.drain(0..split);
        self.last_cleanup_nanos = now.as_nanos() as u64;
    }

    pub fn info(&self) -> WindowInfo {
        WindowInfo {
            count: self.events.len() as u64,
            limit: self.limit,
            total_requests: self.total_requests,
            denied_requests: self.denied_requests,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindowAlgorithm;

impl RateLimitAlgorithm for SlidingWindowAlgorithm {
    fn admit(
        &self,
        prior: Option<&[u8]>,
        now: Duration,
        wall_now: SystemTime,
        spec: &LimitSpec,
        n: u64,
    ) -> Result<(Vec<u8>, Duration, Decision), ThrottlerError> {
        validate_n(n)?;
        spec.validate_bounds()?;

        let mut state = match prior {
            Some(bytes) => serde_json::from_slice::<WindowState>(bytes)?,
            None => WindowState::fresh(spec),
        };

        state.limit = spec.count;
        state.window_nanos = spec.window.as_nanos() as u64;

        state.evict_expired(now);

        let current = state.events.len() as u64;
        let allowed = current + n <= state.limit;

        if allowed {
            let ts = now.as_nanos() as u64;
            state.events.extend(std::iter::repeat(ts).take(n as usize));
            state.total_requests += n;
        } else {
            state.denied_requests += n;
        }

        let used = state.events.len() as u64;
        let remaining = state.limit.saturating_sub(used);

        let retry_after = if allowed {
            Duration::ZERO
        } else {
            // Time until enough of the oldest events fall out of the
            // window to admit `n` more: the (current + n - limit)-th
            // oldest event's expiry.
            let need_to_free = (current + n).saturating_sub(state.limit) as usize;
            match state.events.get(need_to_free.saturating_sub(1)) {
                Some(&oldest_relevant) => {
                    let expiry = oldest_relevant.saturating_add(state.window_nanos);
                    let now_nanos = now.as_nanos() as u64;
                    Duration::from_nanos(expiry.saturating_sub(now_nanos))
                }
                None => spec.window,
            }
        };

        let reset_time = match state.events.first() {
            Some(&oldest) => {
                let age = (now.as_nanos() as u64).saturating_sub(oldest);
                let remaining_life = state.window_nanos.saturating_sub(age);
                wall_now + Duration::from_nanos(remaining_life)
            }
            None => wall_now,
        };

        let decision = Decision {
            allowed,
            remaining,
            limit: state.limit,
            window: spec.window,
            used,
            retry_after,
            reset_time,
            algorithm: AlgorithmKind::SlidingWindow,
        };

        // An hour of slack past the window itself: long enough that a key
        // idle for exactly one window doesn't get reclaimed moments before
        // its next legitimate request.
        let ttl = spec.window + Duration::from_secs(3600);

        let bytes = serde_json::to_vec(&state)?;
        Ok((bytes, ttl, decision))
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SlidingWindow
    }
}

//! # Limit specification parsing
//!
//! Converts a human-readable `"<count>/<unit>"` (optionally
//! `"<count>/<multiplier><unit>"`) string into a validated `(count, window)`
//! pair. This is a pure helper - turning a parsed `LimitSpec` into
//! framework-specific config sugar ("100/minute" in a YAML file) is a
//! collaborator's job, not this crate's.

use crate::error::ThrottlerError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use validator::Validate;

const MAX_COUNT: u64 = 1_000_000;
const MIN_WINDOW: Duration = Duration::from_secs(1);
const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_TOKEN_BUCKET_REFILL_RATE: f64 = 1_000.0;

/// A validated `(count, window)` pair bounding admissions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct LimitSpec {
    #[validate(range(min = 1, max = 1_000_000))]
    pub count: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl LimitSpec {
    pub fn new(count: u64, window: Duration) -> Result<Self, ThrottlerError> {
        let spec = LimitSpec { count, window };
        spec.validate_bounds()?;
        Ok(spec)
    }

    /// Validation bounds shared by both algorithms: `count` in `(0,
    /// 1_000_000]`, `window` in `[1s, 24h]`. Token-bucket's additional
    /// refill-rate bound is checked separately via
    /// [`LimitSpec::refill_rate`] / [`LimitSpec::validate_for_token_bucket`],
    /// since it's a derived quantity, not a stored field.
    pub fn validate_bounds(&self) -> Result<(), ThrottlerError> {
        if self.count == 0 {
            return Err(ThrottlerError::config("limit count must be > 0"));
        }
        if self.count > MAX_COUNT {
            return Err(ThrottlerError::config(format!(
                "limit count {} exceeds maximum of {MAX_COUNT}",
                self.count
            )));
        }
        if self.window < MIN_WINDOW {
            return Err(ThrottlerError::config(format!(
                "window {:?} is below the minimum of {MIN_WINDOW:?}",
                self.window
            )));
        }
        if self.window > MAX_WINDOW {
            return Err(ThrottlerError::config(format!(
                "window {:?} exceeds the maximum of {MAX_WINDOW:?}",
                self.window
            )));
        }
        Ok(())
    }

    /// `count / window_seconds`, tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.count as f64 / self.window.as_secs_f64()
    }

    pub fn validate_for_token_bucket(&self) -> Result<(), ThrottlerError> {
        self.validate_bounds()?;
        let rate = self.refill_rate();
        if rate > MAX_TOKEN_BUCKET_REFILL_RATE {
            return Err(ThrottlerError::config(format!(
                "derived refill rate {rate:.2} tokens/s exceeds the token-bucket maximum of {MAX_TOKEN_BUCKET_REFILL_RATE}"
            )));
        }
        Ok(())
    }
}

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+)\s*/\s*(\d*)\s*(s|sec|second|m|min|minute|h|hour|d|day)s?\s*$")
            .expect("limit spec grammar is a valid regex")
    })
}

/// Parses `"<count>/<unit>"`, where `unit` is one of `s`/`second`,
/// `m`/`minute`, `h`/`hour`, `d`/`day` (case-insensitive, short or long
/// form), with an optional multiplier (`"100/5m"` = 100 per 5 minutes).
///
/// # Examples
/// ```
/// use throttler::limit_spec::parse_limit_spec;
/// use std::time::Duration;
///
/// let spec = parse_limit_spec("100/minute").unwrap();
/// assert_eq!(spec.count, 100);
/// assert_eq!(spec.window, Duration::from_secs(60));
///
/// let spec = parse_limit_spec("100/5m").unwrap();
/// assert_eq!(spec.window, Duration::from_secs(300));
/// ```
pub fn parse_limit_spec(literal: &str) -> Result<LimitSpec, ThrottlerError> {
    let caps = grammar().captures(literal).ok_or_else(|| {
        ThrottlerError::config(format!("invalid limit spec literal: {literal:?}"))
    })?;

    let count: u64 = caps[1]
        .parse()
        .map_err(|_| ThrottlerError::config(format!("invalid count in limit spec: {literal:?}")))?;

    let multiplier: u64 = if caps[2].is_empty() {
        1
    } else {
        caps[2].parse().map_err(|_| {
            ThrottlerError::config(format!("invalid multiplier in limit spec: {literal:?}"))
        })?
    };

    let unit_seconds: u64 = match caps[3].to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" => 1,
        "m" | "min" | "minute" => 60,
        "h" | "hour" => 3600,
        "d" | "day" => 86_400,
        other => {
            return Err(ThrottlerError::config(format!(
                "unrecognized unit {other:?} in limit spec: {literal:?}"
            )))
        }
    };

    if multiplier == 0 {
        return Err(ThrottlerError::config(format!(
            "multiplier must be > 0 in limit spec: {literal:?}"
        )));
    }

    let window = Duration::from_secs(multiplier * unit_seconds);
    LimitSpec::new(count, window)
}

//! # Clock abstraction
//!
//! Both algorithms need a monotonic source for interval math (refill,
//! window cleanup) and a wall clock only for the externally reported
//! `reset_time`. Reading `SystemTime::now()`
//! directly from algorithm code makes it impossible to drive deterministic
//! time sequences in tests, so it is injected instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of time for one admission call.
///
/// `monotonic_now` must be non-decreasing within a single admitting
/// process; no cross-node synchronization is assumed.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Opaque, non-decreasing instant used for refill/window math.
    fn monotonic_now(&self) -> Duration;

    /// Wall-clock instant, used only for reporting `reset_time`.
    fn wall_now(&self) -> SystemTime {
        UNIX_EPOCH + self.monotonic_now()
    }
}

/// Default clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn monotonic_now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A settable clock for deterministic unit and property tests.
///
/// Cloning shares the underlying counter, so a test can advance time from
/// outside while an algorithm call holds the clone it was constructed with.
#[derive(Debug, Clone)]
pub struct FrozenClock {
    nanos: Arc<AtomicU64>,
}

impl FrozenClock {
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos() as u64)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for FrozenClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(1_700_000_000))
    }
}

impl Clock for FrozenClock {
    fn monotonic_now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

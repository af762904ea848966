//! # Store - the persistence abstraction
//!
//! A key-addressed opaque-bytes repository with per-key TTL, shared by both
//! admission algorithms.
//!
//! Implementations must provide the two guarantees the algorithms rely on:
//! atomic replacement (a `set` is either fully visible or not) and
//! per-key serializability (concurrent admissions against the *same* key
//! observe a total order consistent with some serial schedule).
//! Independent keys need no ordering at all.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a [`Store`] implementation can raise. Distinct from
/// [`crate::error::ThrottlerError`] so that a backend crate boundary stays
/// narrow; the pipeline converts at the edge.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("store operation timed out")]
    Timeout,

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("state serialization error: {0}")]
    Serialization(String),
}

/// Key-addressed opaque-bytes repository with per-key TTL.
///
/// `get`/`set`/`delete` are the minimum contract; `compare_and_set` is
/// required only when a backend cannot otherwise serialize an algorithm's
/// read-compute-write triple. The in-memory backend serializes
/// via a per-key lock instead and can implement `compare_and_set` trivially
/// on top of that lock.
#[async_trait]
pub trait Store: Send + Sync {
    /// Snapshot read. `Err(StoreError::NotFound)` is a normal control
    /// signal meaning "initialize new state", not a failure.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write with absolute expiration `now + ttl`, replacing any prior
    /// value and its TTL. TTL monotonicity is not required: a shorter TTL
    /// on a refreshed write is fine.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Idempotent remove.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomic compare-and-swap: write `new_value` only if the current value
    /// equals `expected`, where `None` means "key absent". Returns whether
    /// the swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Health probe, delegated to by [`crate::pipeline::DecisionPipeline::health`].
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Races a store future against a cancellation token and an optional
/// timeout, mapping either to the appropriate [`StoreError`]. Used by both
/// backends so cancellation/timeout behavior is uniform.
pub(crate) async fn guarded<F, T>(
    fut: F,
    cancel: Option<&CancellationToken>,
    timeout: Option<Duration>,
) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    use tokio::time::timeout as tokio_timeout;

    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    match timeout {
        Some(d) => {
            tokio::select! {
                biased;
                _ = cancelled => Err(StoreError::Cancelled),
                res = tokio_timeout(d, fut) => match res {
                    Ok(inner) => inner,
                    Err(_) => Err(StoreError::Timeout),
                },
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = cancelled => Err(StoreError::Cancelled),
                res = fut => res,
            }
        }
    }
}

//! In-memory [`Store`](super::Store) backend.
//!
//! Single-process, Redis-free storage for development and for entities that
//! don't need cross-instance sharing. Uses [`dashmap::DashMap`] so that
//! unrelated keys proceed fully in parallel instead of serializing every
//! entity behind one library-wide mutex, the same shape a sharded
//! connection pool reaches for when it needs a concurrent map instead of
//! `Mutex<HashMap<_>>`.

use super::{Store, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory store. Cheap to clone (shares the underlying map via `Arc`).
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    reaper_handle: Arc<ReaperHandle>,
}

struct ReaperHandle {
    stop: CancellationToken,
    // Keeps the spawned task's `JoinHandle` so the task is aborted (not
    // just orphaned) when the last `MemoryStore` clone drops.
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.stop.cancel();
        self.task.abort();
    }
}

impl MemoryStore {
    /// Creates a store with a background reaper sweeping expired entries
    /// every `sweep_interval`. A lazy check-on-`get` already guarantees
    /// correctness; the periodic sweep only bounds memory for
    /// keys nobody reads again before they'd otherwise expire.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());
        let stop = CancellationToken::new();

        let reaper_entries = entries.clone();
        let reaper_stop = stop.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = reaper_stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        // Never held across the whole map: `retain` still
                        // locks one shard at a time under the hood.
                        reaper_entries.retain(|_, e| !e.is_expired(now));
                    }
                }
            }
        });

        Self {
            entries,
            reaper_handle: Arc::new(ReaperHandle { stop, task }),
        }
    }

    /// Store with no background reaper. Expired entries are only reclaimed
    /// lazily on `get`/`compare_and_set`. Useful in tests that don't run a
    /// Tokio timer driver.
    pub fn without_reaper() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            reaper_handle: Arc::new(ReaperHandle {
                stop: CancellationToken::new(),
                task: tokio::spawn(async {}),
            }),
        }
    }

    fn get_live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get_live(key).ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // `DashMap::entry` holds the shard lock for the duration of the
        // closure, which is exactly the atomic read-compare-write the
        // contract requires, no separate get()+set() race window.
        let now = Instant::now();
        let swapped = match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                let current = if occ.get().is_expired(now) {
                    None
                } else {
                    Some(occ.get().value.as_slice())
                };
                if current == expected {
                    occ.insert(Entry {
                        value: new_value,
                        expires_at: now + ttl,
                    });
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                if expected.is_none() {
                    vac.insert(Entry {
                        value: new_value,
                        expires_at: now + ttl,
                    });
                    true
                } else {
                    false
                }
            }
        };
        Ok(swapped)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

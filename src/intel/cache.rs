// src/intel/cache.rs
//! (source, topic) → items cache with absolute TTL and single-flight fetches.
//!
//! A key is either `Ready` (items + expiry) or `InFlight` (a shared handle to
//! the one running fetch). Concurrent callers for an in-flight key await the
//! same handle instead of fetching again. The fetch itself runs as its own
//! task and writes its result back, so a caller that gives up (deadline)
//! does not cancel it for the others. Failures are never cached, and a zero
//! TTL leaves nothing behind. Expired entries are swept whenever the map
//! grows past its high-water mark.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::intel::error::{FetchError, FetchFailure};
use crate::intel::instant_after;
use crate::intel::types::{IntelItem, SourceId};

/// Slot count that triggers the first sweep of expired entries.
const PURGE_FLOOR: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: SourceId,
    pub topic: String,
}

impl CacheKey {
    pub fn new(source: SourceId, topic: impl Into<String>) -> Self {
        Self {
            source,
            topic: topic.into(),
        }
    }
}

pub type FetchOutcome = Result<Arc<Vec<IntelItem>>, FetchFailure>;

/// How a lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
    Joined,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Arc<Vec<IntelItem>>,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

enum Slot {
    Ready(CacheEntry),
    InFlight { generation: u64, fetch: SharedFetch },
}

struct Inner {
    slots: HashMap<CacheKey, Slot>,
    next_generation: u64,
    /// Sweep expired entries before inserting once `slots` reaches this size.
    purge_at: usize,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_generation: 0,
            purge_at: PURGE_FLOOR,
        }
    }
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => entry.is_live(now),
            Slot::InFlight { .. } => true,
        });
        before - self.slots.len()
    }

    fn is_current(&self, key: &CacheKey, generation: u64) -> bool {
        matches!(
            self.slots.get(key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        )
    }
}

#[derive(Clone, Default)]
pub struct IntelCache {
    inner: Arc<Mutex<Inner>>,
}

enum Found {
    Hit(Arc<Vec<IntelItem>>),
    InFlight(SharedFetch),
    Nothing,
}

impl IntelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `key` from the cache, join an in-flight fetch, or start `fetch`.
    ///
    /// `fetch` is only called when this caller becomes the leader for the key.
    pub async fn get_or_fetch<F>(&self, key: CacheKey, ttl: Duration, fetch: F) -> (FetchOutcome, Lookup)
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome>,
    {
        let (shared, lookup) = {
            let mut inner = lock(&self.inner);
            let now = Instant::now();
            let found = match inner.slots.get(&key) {
                Some(Slot::Ready(entry)) if entry.is_live(now) => Found::Hit(entry.items.clone()),
                Some(Slot::InFlight { fetch: pending, .. }) => Found::InFlight(pending.clone()),
                _ => Found::Nothing,
            };

            match found {
                Found::Hit(items) => return (Ok(items), Lookup::Hit),
                Found::InFlight(shared) => (shared, Lookup::Joined),
                Found::Nothing => {
                    if inner.slots.len() >= inner.purge_at {
                        let dropped = inner.purge_expired(now);
                        inner.purge_at = (inner.slots.len() * 2).max(PURGE_FLOOR);
                        tracing::debug!(target: "intel", dropped, remaining = inner.slots.len(), "swept expired cache entries");
                    }
                    inner.next_generation += 1;
                    let generation = inner.next_generation;
                    let task = tokio::spawn(write_back(
                        Arc::clone(&self.inner),
                        key.clone(),
                        generation,
                        ttl,
                        fetch(),
                    ));
                    let slots = Arc::clone(&self.inner);
                    let task_key = key.clone();
                    let shared = async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                let mut inner = lock(&slots);
                                if inner.is_current(&task_key, generation) {
                                    inner.slots.remove(&task_key);
                                }
                                drop(inner);
                                tracing::warn!(target: "intel", source = %task_key.source, topic = %task_key.topic, error = %e, "fetch task failed");
                                Err(FetchFailure {
                                    error: FetchError::Aborted(e.to_string()),
                                    attempts: 1,
                                })
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    inner.slots.insert(
                        key,
                        Slot::InFlight {
                            generation,
                            fetch: shared.clone(),
                        },
                    );
                    (shared, Lookup::Miss)
                }
            }
        };

        (shared.await, lookup)
    }

    /// Live entry for `key`, if any. Never returns expired data.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<IntelItem>>> {
        let inner = lock(&self.inner);
        match inner.slots.get(key) {
            Some(Slot::Ready(entry)) if entry.is_live(Instant::now()) => Some(entry.items.clone()),
            _ => None,
        }
    }

    /// Drop a ready entry. In-flight fetches are left alone.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = lock(&self.inner);
        if matches!(inner.slots.get(key), Some(Slot::Ready(_))) {
            inner.slots.remove(key);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.slots.retain(|_, slot| matches!(slot, Slot::InFlight { .. }));
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        lock(&self.inner).purge_expired(Instant::now())
    }

    /// Every stored slot, expired and in-flight ones included.
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let inner = lock(&self.inner);
        let now = Instant::now();
        inner
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(entry) if entry.is_live(now)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn write_back(
    inner: Arc<Mutex<Inner>>,
    key: CacheKey,
    generation: u64,
    ttl: Duration,
    fetch: BoxFuture<'static, FetchOutcome>,
) -> FetchOutcome {
    let outcome = fetch.await;

    let mut guard = lock(&inner);
    if guard.is_current(&key, generation) {
        match &outcome {
            Ok(items) if !ttl.is_zero() => {
                guard.slots.insert(
                    key,
                    Slot::Ready(CacheEntry {
                        items: Arc::clone(items),
                        expires_at: instant_after(Instant::now(), ttl),
                    }),
                );
            }
            _ => {
                guard.slots.remove(&key);
            }
        }
    }
    drop(guard);

    outcome
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Query-result cache keyed by the exact query string.
//!
//! Entries are reloaded once older than the ttl; staleness up to the ttl is
//! accepted. Concurrent lookups of the same key share a single in-flight
//! oracle call. Errors are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::domain::error::OracleError;
use crate::metrics::METRICS;
use crate::query::QueryOracle;

#[derive(Debug, Clone, Copy)]
struct Cached {
    value: bool,
    loaded_at: Instant,
}

type Slot = Arc<OnceCell<Cached>>;

/// Bounded, time-refreshed cache of oracle answers.
#[derive(Debug)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, Slot>>,
    capacity: usize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Return the cached answer for `key`, calling `load` when it is missing
    /// or older than `ttl`. Callers racing on the same key wait for one load.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<bool, OracleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool, OracleError>>,
    {
        let slot = self.slot(key, ttl).await;
        if let Some(cached) = slot.get() {
            METRICS.inc_cache_hits();
            return Ok(cached.value);
        }
        let loaded = slot
            .get_or_try_init(|| async {
                METRICS.inc_queries();
                load().await.map(|value| Cached {
                    value,
                    loaded_at: Instant::now(),
                })
            })
            .await;
        match loaded {
            Ok(cached) => Ok(cached.value),
            Err(e) => {
                self.discard(key, &slot).await;
                Err(e)
            }
        }
    }

    /// Remove a slot whose load failed, unless it was replaced or filled since.
    async fn discard(&self, key: &str, slot: &Slot) {
        let mut entries = self.entries.lock().await;
        let unchanged = entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.get().is_none());
        if unchanged {
            entries.remove(key);
        }
    }

    /// Number of entries currently held, including in-flight ones.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Find the slot for `key`, replacing it when expired.
    async fn slot(&self, key: &str, ttl: Duration) -> Slot {
        let mut entries = self.entries.lock().await;
        if let Some(slot) = entries.get(key) {
            let fresh = slot.get().map_or(true, |c| c.loaded_at.elapsed() < ttl);
            if fresh {
                return Arc::clone(slot);
            }
        }
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            evict(&mut entries, ttl, self.capacity);
        }
        let slot: Slot = Arc::new(OnceCell::new());
        entries.insert(key.to_string(), Arc::clone(&slot));
        slot
    }
}

/// Drop expired entries and empty slots nobody is loading; if still full,
/// drop the oldest loaded one.
fn evict(entries: &mut HashMap<String, Slot>, ttl: Duration, capacity: usize) {
    entries.retain(|_, slot| match slot.get() {
        Some(c) => c.loaded_at.elapsed() < ttl,
        None => Arc::strong_count(slot) > 1,
    });
    if entries.len() < capacity {
        return;
    }
    let oldest = entries
        .iter()
        .filter_map(|(key, slot)| slot.get().map(|c| (key.clone(), c.loaded_at)))
        .min_by_key(|(_, loaded_at)| *loaded_at)
        .map(|(key, _)| key);
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

/// A [`QueryOracle`] that answers from a shared [`QueryCache`].
pub struct CachedOracle {
    inner: Arc<dyn QueryOracle>,
    cache: Arc<QueryCache>,
    ttl: Duration,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn QueryOracle>, cache: Arc<QueryCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl QueryOracle for CachedOracle {
    async fn has_results(&self, query: &str) -> Result<bool, OracleError> {
        let inner = Arc::clone(&self.inner);
        self.cache
            .get_or_refresh(query, self.ttl, || async move { inner.has_results(query).await })
            .await
    }
}

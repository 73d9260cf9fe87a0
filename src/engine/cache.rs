// Keyed metadata cache with fetch coalescing — one computation per key
// regardless of caller concurrency.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A cached value plus the instant it was stored.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheRecord<V> {
    pub value: V,
    pub cached_at: Instant,
}

/// Failure of a coalesced fetch, delivered identically to every attached
/// waiter. Wraps the representative error so it can be cloned cheaply.
#[derive(Debug, Clone)]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for FetchError {}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

type Settled<V> = Option<Result<V, FetchError>>;

struct Inner<K, V> {
    records: HashMap<K, CacheRecord<V>>,
    pending: HashMap<K, watch::Receiver<Settled<V>>>,
}

/// Generic keyed cache with request deduplication.
///
/// Cloning is cheap and every clone shares the same maps. The record map and
/// the pending-fetch map live under one mutex so the check-then-register
/// step is atomic per key: concurrent `get_or_fetch` calls for the same key
/// attach to a single representative fetch.
pub struct MetadataCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K, V> Clone for MetadataCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for MetadataCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MetadataCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: HashMap::new(),
                pending: HashMap::new(),
            })),
        }
    }

    /// Synchronous cache read. Never computes, never blocks.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().records.get(key).map(|r| r.value.clone())
    }

    /// Like `peek`, but also returns when the value was cached.
    pub fn peek_record(&self, key: &K) -> Option<CacheRecord<V>> {
        self.inner.lock().records.get(key).cloned()
    }

    /// Replace the record for `key` outright (last write wins).
    pub fn store(&self, key: K, value: V) {
        self.inner.lock().records.insert(
            key,
            CacheRecord {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove the record for `key`. An in-flight fetch for the same key is
    /// not cancelled and may repopulate the cache when it settles.
    pub fn invalidate(&self, key: &K) {
        self.inner.lock().records.remove(key);
    }

    /// Remove every record. In-flight fetches are untouched.
    pub fn invalidate_all(&self) {
        self.inner.lock().records.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Return the cached value for `key`, or compute it via `fetcher`.
    ///
    /// If a fetch for `key` is already outstanding, this call attaches to it
    /// instead of invoking `fetcher`. On success the value is cached and
    /// returned to every attached caller; on failure nothing is cached and
    /// every attached caller receives the same error.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.fetch_inner(key, fetcher, false).await
    }

    /// Recompute the value for `key`, ignoring any cached record.
    ///
    /// If a fetch for `key` is already outstanding this attaches to it, so
    /// at most one fetch per key is in flight even while foreground gets and
    /// background refreshes overlap. On success the record is replaced.
    pub async fn refresh<F, Fut>(&self, key: K, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.fetch_inner(key, fetcher, true).await
    }

    async fn fetch_inner<F, Fut>(
        &self,
        key: K,
        fetcher: F,
        bypass_record: bool,
    ) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (lead_tx, mut rx) = {
            let mut inner = self.inner.lock();
            if !bypass_record {
                if let Some(record) = inner.records.get(&key) {
                    return Ok(record.value.clone());
                }
            }
            if let Some(rx) = inner.pending.get(&key) {
                debug!("attaching to in-flight fetch for {:?}", key);
                (None, rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                inner.pending.insert(key.clone(), rx.clone());
                (Some(tx), rx)
            }
        };

        // The representative fetch runs in its own task so it settles (and
        // populates the cache) even if every awaiting caller is dropped.
        if let Some(tx) = lead_tx {
            let shared = Arc::clone(&self.inner);
            let task_key = key.clone();
            let fut = fetcher();
            tokio::spawn(async move {
                let outcome = fut.await.map_err(FetchError::from);
                let mut inner = shared.lock();
                inner.pending.remove(&task_key);
                match &outcome {
                    Ok(value) => {
                        inner.records.insert(
                            task_key,
                            CacheRecord {
                                value: value.clone(),
                                cached_at: Instant::now(),
                            },
                        );
                    }
                    Err(err) => {
                        warn!("fetch for {:?} failed: {}", task_key, err);
                    }
                }
                let _ = tx.send(Some(outcome));
            });
        }

        // Clone the settled value out of the watch `Ref` so the mutable
        // borrow of `rx` ends before the error arm (which needs `&rx`).
        let wait_outcome = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => Ok((*slot).clone()),
            Err(err) => Err(err),
        };

        let settled = match wait_outcome {
            Ok(settled) => settled,
            Err(_) => {
                // The fetch task died without settling (fetcher panic).
                // Drop the stale pending entry so the next call starts fresh.
                let mut inner = self.inner.lock();
                if let Some(existing) = inner.pending.get(&key) {
                    if existing.same_channel(&rx) {
                        inner.pending.remove(&key);
                    }
                }
                return Err(FetchError::from(anyhow!(
                    "fetch task for {:?} dropped before settling",
                    key
                )));
            }
        };

        match settled {
            Some(outcome) => outcome,
            None => Err(FetchError::from(anyhow!(
                "fetch for {:?} settled without an outcome",
                key
            ))),
        }
    }
}

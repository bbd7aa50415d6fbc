use crate::builder::CacheBuilder;
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::key::RequestDescriptor;
use crate::loader::{LoadFuture, LoadGuard, PendingLoad};
use crate::metrics::{CacheStats, Metrics};
use crate::shared::CacheShared;
use crate::store::Lookup;
use crate::task::janitor::SweepReport;

use std::fmt;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

/// A thread-safe, asynchronous request cache keyed by strings.
///
/// Cloning the handle is cheap and every clone shares the same entries,
/// in-flight loads and counters. Build one per process and hand clones to
/// whatever needs it.
pub struct RequestCache<V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<String, V, H>>,
}

impl<V, H> Clone for RequestCache<V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<V, H> fmt::Debug for RequestCache<V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<V> RequestCache<V> {
  /// Shorthand for [`CacheBuilder::new`].
  pub fn builder() -> CacheBuilder<V> {
    CacheBuilder::new()
  }
}

impl<V, H> RequestCache<V, H>
where
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Retrieves a live value from the cache.
  ///
  /// Counts a hit or a miss. An expired entry is removed and reported as a
  /// miss; stale data is never returned.
  pub fn get(&self, key: &str) -> Option<Arc<V>> {
    match self.shared.store.lookup(key) {
      Lookup::Hit(value) => {
        self.record_hit(key);
        Some(value)
      }
      Lookup::Expired => {
        self.record_miss(key, true);
        None
      }
      Lookup::Miss => {
        self.record_miss(key, false);
        None
      }
    }
  }

  /// Inserts a value under the cache's default TTL, replacing any entry.
  pub fn insert(&self, key: impl Into<String>, value: V) {
    self.insert_with_ttl(key, value, self.shared.default_ttl);
  }

  /// Inserts a value that stays valid for `ttl`, replacing any entry.
  pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
    self.store_value(key.into(), Arc::new(value), ttl);
  }

  /// Removes an entry from the cache, returning `true` if the key was found.
  pub fn invalidate(&self, key: &str) -> bool {
    let removed = self.shared.store.remove(key);
    if removed {
      Metrics::record(&self.shared.metrics.invalidations);
    }
    removed
  }

  /// Removes all entries, forgets every pending load and zeroes the counters.
  ///
  /// Loads already running keep their awaiters and still write their result
  /// when they finish.
  pub fn clear(&self) {
    self.shared.clear();
  }

  /// Returns the value for `key`, loading it with `operation` on a miss.
  ///
  /// Concurrent calls for the same key share one load: `operation` is
  /// invoked by exactly one of them and every caller receives the same value
  /// or the same error. A successful value is cached for `ttl`; a failure is
  /// never cached, so the next call starts a fresh load.
  ///
  /// `operation` is called on the current task; the future it returns runs
  /// on a spawned task and keeps running even if every caller stops waiting.
  pub async fn deduplicate<F, Fut>(&self, key: impl Into<String>, ttl: Duration, operation: F) -> Result<Arc<V>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    let key = key.into();

    // Counted once the outcome is known, so a value that lands between
    // this lookup and the lock below is a hit, not a miss.
    let expired = match self.shared.store.lookup(key.as_str()) {
      Lookup::Hit(value) => {
        self.record_hit(&key);
        return Ok(value);
      }
      Lookup::Expired => true,
      Lookup::Miss => false,
    };

    let (future, leader) = {
      let mut pending = self.shared.pending.lock();

      if let Some(value) = self.shared.store.peek(key.as_str()) {
        self.record_hit(&key);
        return Ok(value);
      }
      self.record_miss(&key, expired);

      match pending.get(&key) {
        Some(load) => (Arc::clone(&load.future), false),
        None => {
          let future = Arc::new(LoadFuture::new());
          pending.insert(key.clone(), PendingLoad::new(Arc::clone(&future)));
          (future, true)
        }
      }
    };

    if !leader {
      drop(operation);
      Metrics::record(&self.shared.metrics.deduplicated);
      tracing::debug!(key = %key, "joining in-flight load");
      return (&*future).await;
    }

    tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache miss, starting load");

    // Created before `operation` runs so that a panic inside it still clears
    // the pending entry.
    let guard = LoadGuard::new(Arc::clone(&self.shared.pending), key, Arc::clone(&future));
    let load = operation();

    let this = self.clone();
    self.shared.spawner.spawn(Box::pin(async move {
      match load.await {
        Ok(value) => {
          let value = Arc::new(value);
          this.store_value(guard.key().clone(), Arc::clone(&value), ttl);
          tracing::debug!(key = %guard.key(), "load completed");
          guard.settle(Ok(value));
        }
        Err(err) => {
          tracing::warn!(key = %guard.key(), error = %err, "load failed");
          guard.settle(Err(err));
        }
      }
    }));

    (&*future).await
  }

  /// Fetches `request` through the cache.
  ///
  /// The cache key is derived from the request's method, URL and body. `ttl`
  /// falls back to the cache's default TTL. HTTP failures come back as
  /// [`FetchError::Status`](crate::FetchError::Status); no retry happens
  /// here.
  pub async fn fetch_with_cache<F>(&self, request: &RequestDescriptor, ttl: Option<Duration>, fetcher: &F) -> Result<Arc<V>>
  where
    F: Fetch<V> + ?Sized,
  {
    let ttl = ttl.unwrap_or(self.shared.default_ttl);
    self
      .deduplicate(request.cache_key(), ttl, || fetcher.fetch(request))
      .await
  }

  /// Purges expired entries and pending loads older than the pending TTL.
  ///
  /// Lazy expiry on read keeps results correct without it; sweeping only
  /// reclaims memory and keeps the reported sizes honest.
  pub fn sweep(&self) -> SweepReport {
    self.shared.sweep()
  }

  /// Sweeps, then returns a snapshot of the cache's counters and sizes.
  pub fn stats(&self) -> CacheStats {
    self.shared.sweep();
    self
      .shared
      .metrics
      .snapshot(self.shared.store.len(), self.shared.pending.len())
  }

  /// Entries currently stored, including expired ones not yet swept.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Loads currently in flight.
  pub fn pending_len(&self) -> usize {
    self.shared.pending.len()
  }

  fn record_hit(&self, key: &str) {
    Metrics::record(&self.shared.metrics.hits);
    tracing::trace!(key, "cache hit");
  }

  fn record_miss(&self, key: &str, expired: bool) {
    Metrics::record(&self.shared.metrics.misses);
    if expired {
      Metrics::record(&self.shared.metrics.expired);
      tracing::trace!(key, "cache entry expired");
    }
  }

  fn store_value(&self, key: String, value: Arc<V>, ttl: Duration) {
    self.shared.store.insert(key, CacheEntry::new(value, ttl));
    Metrics::record(&self.shared.metrics.inserts);
  }
}

use crate::loader::PendingLoads;
use crate::metrics::Metrics;
use crate::store::ShardedStore;
use crate::task::janitor::{Janitor, JanitorContext, SweepReport};
use crate::TaskSpawner;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// The internal, thread-safe core of the cache.
///
/// Every `RequestCache` handle points at one of these. The store and the
/// pending tracker are never exposed outside the crate.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) pending: Arc<PendingLoads<K, V, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) janitor: Option<Janitor>,
  pub(crate) default_ttl: Duration,
  pub(crate) pending_ttl: Duration,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("store", &self.store)
      .field("default_ttl", &self.default_ttl)
      .field("pending_ttl", &self.pending_ttl)
      .field("has_janitor", &self.janitor.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.take() {
      janitor.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// The janitor's view of this core. Both share the same sweep.
  pub(crate) fn janitor_context(&self) -> JanitorContext<K, V, H> {
    JanitorContext {
      store: Arc::clone(&self.store),
      pending: Arc::clone(&self.pending),
      metrics: Arc::clone(&self.metrics),
      pending_ttl: self.pending_ttl,
    }
  }

  pub(crate) fn sweep(&self) -> SweepReport {
    self.janitor_context().sweep()
  }

  /// Drops every entry and pending load and zeroes the counters.
  pub(crate) fn clear(&self) {
    let entries = self.store.clear();
    let pending = self.pending.clear();
    self.metrics.reset();
    tracing::debug!(entries, pending, "cache cleared");
  }
}

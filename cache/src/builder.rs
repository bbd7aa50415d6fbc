use crate::config::{CacheConfig, DEFAULT_PENDING_TTL, DEFAULT_TTL};
use crate::error::BuildError;
use crate::handles::RequestCache;
use crate::loader::PendingLoads;
use crate::metrics::Metrics;
use crate::runtime::TokioSpawner;
use crate::shared::CacheShared;
use crate::store::ShardedStore;
use crate::task::janitor::Janitor;
use crate::TaskSpawner;

use core::fmt;
use std::hash::BuildHasher;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating [`RequestCache`] instances.
pub struct CacheBuilder<V, H = ahash::RandomState> {
  pub(crate) shards: usize,
  pub(crate) default_ttl: Duration,
  pub(crate) pending_ttl: Duration,
  pub(crate) hasher: H,
  pub(crate) cleanup_interval: Option<Duration>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  _value_marker: PhantomData<fn() -> V>,
}

// Manual Debug implementation for CacheBuilder.
impl<V, H> fmt::Debug for CacheBuilder<V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("default_ttl", &self.default_ttl)
      .field("pending_ttl", &self.pending_ttl)
      .field("cleanup_interval", &self.cleanup_interval)
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<V, H> CacheBuilder<V, H> {
  /// Sets the number of concurrent shards to use.
  pub fn shards(mut self, shards: usize) -> Self {
    // Zero is kept so that `build` can reject it; anything else is rounded
    // up to a power of two for fast bitwise ANDing.
    self.shards = if shards == 0 { 0 } else { shards.next_power_of_two() };
    self
  }

  /// Sets the TTL used by `insert` and by `fetch_with_cache` when the caller
  /// does not name one. Defaults to 120 seconds.
  pub fn default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// Sets the age after which an unsettled pending load is forgotten by a
  /// sweep. Defaults to 30 seconds.
  pub fn pending_ttl(mut self, ttl: Duration) -> Self {
    self.pending_ttl = ttl;
    self
  }

  /// Runs a background sweep every `interval`. Without it, expired entries
  /// are only dropped when read or when stats are taken.
  pub fn cleanup_interval(mut self, interval: Duration) -> Self {
    self.cleanup_interval = Some(interval);
    self
  }

  /// Sets the spawner that runs loads. Defaults to the current Tokio runtime.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the hasher for the cache.
  pub fn hasher<H2>(self, hasher: H2) -> CacheBuilder<V, H2> {
    CacheBuilder {
      shards: self.shards,
      default_ttl: self.default_ttl,
      pending_ttl: self.pending_ttl,
      hasher,
      cleanup_interval: self.cleanup_interval,
      spawner: self.spawner,
      _value_marker: PhantomData,
    }
  }

  /// Applies every cache-level setting from a [`CacheConfig`].
  pub fn config(mut self, config: &CacheConfig) -> Self {
    self.default_ttl = config.default_ttl;
    self.pending_ttl = config.pending_ttl;
    self.cleanup_interval = config.cleanup_interval;
    if let Some(shards) = config.shards {
      self = self.shards(shards);
    }
    self
  }
}

// --- Default Constructor ---
impl<V, H: BuildHasher + Default> CacheBuilder<V, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      default_ttl: DEFAULT_TTL,
      pending_ttl: DEFAULT_PENDING_TTL,
      hasher: H::default(),
      cleanup_interval: None,
      spawner: None,
      _value_marker: PhantomData,
    }
  }

  /// Creates a builder preloaded from a [`CacheConfig`].
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new().config(config)
  }
}

impl<V> Default for CacheBuilder<V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<V, H> CacheBuilder<V, H>
where
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache.
  ///
  /// Must be called from within a Tokio runtime unless a spawner was set.
  pub fn build(mut self) -> Result<RequestCache<V, H>, BuildError> {
    self.validate()?;

    let spawner = match self.spawner.take() {
      Some(spawner) => spawner,
      None => match TokioSpawner::try_current() {
        Some(spawner) => Arc::new(spawner) as Arc<dyn TaskSpawner>,
        None => return Err(BuildError::SpawnerRequired),
      },
    };

    let store = Arc::new(ShardedStore::new(self.shards, self.hasher.clone()));
    let pending = Arc::new(PendingLoads::new(self.hasher.clone()));
    let metrics = Arc::new(Metrics::new());

    let mut shared = CacheShared {
      store,
      pending,
      metrics,
      janitor: None,
      default_ttl: self.default_ttl,
      pending_ttl: self.pending_ttl,
      spawner,
    };

    if let Some(interval) = self.cleanup_interval.filter(|d| !d.is_zero()) {
      shared.janitor = Some(Janitor::spawn(shared.janitor_context(), interval));
    }

    tracing::debug!(
      shards = self.shards,
      default_ttl_ms = self.default_ttl.as_millis() as u64,
      janitor = self.cleanup_interval.is_some(),
      "request cache built"
    );

    Ok(RequestCache {
      shared: Arc::new(shared),
    })
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.default_ttl.is_zero() || self.pending_ttl.is_zero() {
      return Err(BuildError::ZeroTtl);
    }
    Ok(())
  }
}

use crate::time;

use std::sync::Arc;
use std::time::Duration;

/// A container for a value in the cache, holding its freshness metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// When the entry was written, in nanoseconds since the cache epoch.
  created_at: u64,
  /// How long the entry stays valid after `created_at`.
  ttl: Duration,
}

impl<V> CacheEntry<V> {
  /// Creates a new `CacheEntry` stamped with the current time.
  pub(crate) fn new(value: Arc<V>, ttl: Duration) -> Self {
    Self {
      value,
      created_at: time::now_nanos(),
      ttl,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn age(&self) -> Duration {
    time::elapsed_since(self.created_at)
  }

  /// An entry is valid while its age is at most its TTL.
  #[inline]
  pub(crate) fn is_expired(&self) -> bool {
    self.age() > self.ttl
  }
}

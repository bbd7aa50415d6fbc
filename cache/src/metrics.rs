use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) deduplicated: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Expiry ---
  pub(crate) expired: CachePadded<AtomicU64>,

  // --- Timestamps for Uptime ---
  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      deduplicated: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      expired: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn record(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn record_n(counter: &AtomicU64, n: usize) {
    if n > 0 {
      counter.fetch_add(n as u64, Ordering::Relaxed);
    }
  }

  /// Zeroes every counter. Uptime keeps counting from construction.
  pub(crate) fn reset(&self) {
    for counter in [
      &self.hits,
      &self.misses,
      &self.deduplicated,
      &self.inserts,
      &self.invalidations,
      &self.expired,
    ] {
      counter.store(0, Ordering::Relaxed);
    }
  }

  /// Creates a point-in-time snapshot of the counters, combined with the
  /// sizes the caller measured.
  pub(crate) fn snapshot(&self, cache_size: usize, pending_requests: usize) -> CacheStats {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let requests = hits + misses;

    CacheStats {
      hits,
      misses,
      requests,
      deduplicated: self.deduplicated.load(Ordering::Relaxed),
      cache_size,
      pending_requests,
      hit_ratio: format_hit_ratio(hits, requests),
      inserts: self.inserts.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// Formats `hits / requests` as a percentage with two decimals, or `"0%"`
/// before the first request.
pub(crate) fn format_hit_ratio(hits: u64, requests: u64) -> String {
  if requests == 0 {
    "0%".to_string()
  } else {
    format!("{:.2}%", hits as f64 / requests as f64 * 100.0)
  }
}

/// A point-in-time, public-facing snapshot of the cache's counters.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CacheStats {
  /// Lookups that found a live entry.
  pub hits: u64,
  /// Lookups that found nothing, or only an expired entry.
  pub misses: u64,
  /// `hits + misses`.
  pub requests: u64,
  /// Callers that joined a load already in flight instead of starting one.
  pub deduplicated: u64,
  /// Entries currently stored.
  pub cache_size: usize,
  /// Loads currently in flight.
  pub pending_requests: usize,
  /// `hits / requests` as a percentage string, e.g. `"66.67%"`.
  pub hit_ratio: String,
  /// Values written, by `insert` or by a completed load.
  pub inserts: u64,
  /// Entries removed by `invalidate`.
  pub invalidations: u64,
  /// Entries dropped for outliving their TTL.
  pub expired: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for CacheStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStats")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("requests", &self.requests)
      .field("deduplicated", &self.deduplicated)
      .field("cache_size", &self.cache_size)
      .field("pending_requests", &self.pending_requests)
      .field("hit_ratio", &self.hit_ratio)
      .field("inserts", &self.inserts)
      .field("invalidations", &self.invalidations)
      .field("expired", &self.expired)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hit_ratio_without_requests() {
    assert_eq!(format_hit_ratio(0, 0), "0%");
  }

  #[test]
  fn hit_ratio_has_two_decimals() {
    assert_eq!(format_hit_ratio(2, 3), "66.67%");
    assert_eq!(format_hit_ratio(1, 1), "100.00%");
    assert_eq!(format_hit_ratio(0, 4), "0.00%");
  }
}

use crate::loader::PendingLoads;
use crate::metrics::Metrics;
use crate::store::ShardedStore;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a single sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Cache entries dropped for outliving their TTL.
  pub expired_entries: usize,
  /// Pending loads forgotten for outliving the pending ceiling.
  pub stale_pending: usize,
}

/// A context object holding the thread-safe parts of the cache that the
/// janitor needs to access.
pub(crate) struct JanitorContext<K, V, H> {
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) pending: Arc<PendingLoads<K, V, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) pending_ttl: Duration,
}

impl<K, V, H> JanitorContext<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Purges expired entries and abandoned pending loads.
  pub(crate) fn sweep(&self) -> SweepReport {
    let expired_entries = self.store.purge_expired();
    Metrics::record_n(&self.metrics.expired, expired_entries);
    let stale_pending = self.pending.purge_stale(self.pending_ttl);

    let report = SweepReport {
      expired_entries,
      stale_pending,
    };
    if report != SweepReport::default() {
      tracing::debug!(
        expired_entries = report.expired_entries,
        stale_pending = report.stale_pending,
        "sweep removed stale state"
      );
    }
    report
  }
}

/// The background task responsible for periodic sweeps of the cache.
pub(crate) struct Janitor {
  handle: JoinHandle<()>, // When janitor is dropped, thread is exited
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<K, V, H>(context: JanitorContext<K, V, H>, tick_interval: Duration) -> Self
  where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
      while !stop_clone.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        context.sweep();

        // Park for the remainder of the tick. `stop` unparks us early.
        if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
          thread::park_timeout(remaining);
        }
      }
    });

    Self { handle, stop_flag }
  }

  /// Signals the janitor thread to exit. It does not wait for it.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Relaxed);
    self.handle.thread().unpark();
  }
}

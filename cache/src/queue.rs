//! A FIFO serializer that enforces a minimum gap between consecutive
//! operations, for rate-limited upstreams.

use crate::config::{CacheConfig, DEFAULT_QUEUE_SPACING};
use crate::error::{BuildError, QueueError};
use crate::runtime::{TaskSpawner, TokioSpawner};

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use fibre::oneshot;
use futures_util::FutureExt;
use parking_lot::Mutex;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueueState {
  items: VecDeque<Job>,
  draining: bool,
}

struct QueueInner {
  state: Mutex<QueueState>,
  spacing: Duration,
  spawner: Arc<dyn TaskSpawner>,
}

/// Runs queued operations one at a time, in the order they were added.
///
/// After an operation finishes, the next one starts no sooner than
/// `spacing` later. At most one drain loop runs per queue; it stops when the
/// queue empties and the next [`add`](RequestQueue::add) starts a new one.
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct RequestQueue {
  inner: Arc<QueueInner>,
}

impl fmt::Debug for RequestQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("RequestQueue")
      .field("spacing", &self.inner.spacing)
      .field("queued", &state.items.len())
      .field("draining", &state.draining)
      .finish()
  }
}

impl Default for RequestQueue {
  fn default() -> Self {
    Self::new(DEFAULT_QUEUE_SPACING)
  }
}

impl RequestQueue {
  /// Creates a queue whose drain loop runs on the current Tokio runtime.
  ///
  /// # Panics
  ///
  /// Panics if called outside of a Tokio runtime. Use [`try_new`](Self::try_new)
  /// or [`with_spawner`](Self::with_spawner) there.
  pub fn new(spacing: Duration) -> Self {
    Self::with_spawner(spacing, Arc::new(TokioSpawner::new()))
  }

  /// Like [`new`](Self::new), but returns [`BuildError::SpawnerRequired`]
  /// outside of a runtime.
  pub fn try_new(spacing: Duration) -> Result<Self, BuildError> {
    match TokioSpawner::try_current() {
      Some(spawner) => Ok(Self::with_spawner(spacing, Arc::new(spawner))),
      None => Err(BuildError::SpawnerRequired),
    }
  }

  /// Creates a queue whose drain loop runs through `spawner`.
  pub fn with_spawner(spacing: Duration, spawner: Arc<dyn TaskSpawner>) -> Self {
    Self::build(spacing, spawner)
  }

  /// Creates a queue using `queue_spacing` from a [`CacheConfig`].
  ///
  /// # Panics
  ///
  /// Panics if called outside of a Tokio runtime, as [`new`](Self::new) does.
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new(config.queue_spacing)
  }

  fn build(spacing: Duration, spawner: Arc<dyn TaskSpawner>) -> Self {
    Self {
      inner: Arc::new(QueueInner {
        state: Mutex::new(QueueState {
          items: VecDeque::new(),
          draining: false,
        }),
        spacing,
        spawner,
      }),
    }
  }

  pub fn spacing(&self) -> Duration {
    self.inner.spacing
  }

  /// Appends `operation` to the queue and waits for its output.
  ///
  /// `operation` is not called until every earlier item has run. A panic
  /// inside it surfaces as [`QueueError::Failed`]; an item discarded by
  /// [`clear`](Self::clear) resolves to [`QueueError::Cancelled`].
  pub async fn add<T, F, Fut>(&self, operation: F) -> Result<T, QueueError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + Unpin + 'static,
  {
    let (tx, rx) = oneshot::oneshot::<Result<T, QueueError>>();

    let job: Job = Box::pin(async move {
      let outcome = AssertUnwindSafe(async move { operation().await })
        .catch_unwind()
        .await
        .map_err(|panic| QueueError::Failed(panic_message(panic.as_ref())));
      // The caller may have stopped waiting.
      let _ = tx.send(outcome);
    });

    let start_drain = {
      let mut state = self.inner.state.lock();
      state.items.push_back(job);
      !std::mem::replace(&mut state.draining, true)
    };

    if start_drain {
      tracing::debug!("request queue drain started");
      let inner = Arc::clone(&self.inner);
      let drain: Job = Box::pin(async move { inner.drain().await });
      self.inner.spawner.spawn(drain);
    }

    match rx.recv().await {
      Ok(outcome) => outcome,
      Err(_) => Err(QueueError::Cancelled),
    }
  }

  /// Discards every item that has not started yet and returns how many.
  ///
  /// Their callers receive [`QueueError::Cancelled`]. The item currently
  /// running, if any, is unaffected.
  pub fn clear(&self) -> usize {
    let discarded = std::mem::take(&mut self.inner.state.lock().items);
    let count = discarded.len();
    // Dropped outside the lock: each job owns a result sender.
    drop(discarded);
    if count > 0 {
      tracing::debug!(count, "request queue cleared");
    }
    count
  }

  /// Items waiting to start.
  pub fn len(&self) -> usize {
    self.inner.state.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl QueueInner {
  async fn drain(&self) {
    while let Some(job) = self.pop_or_stop() {
      job.await;
      if !self.has_more_or_stop() {
        break;
      }
      tokio::time::sleep(self.spacing).await;
    }
    tracing::debug!("request queue drain stopped");
  }

  /// Pops the next job, or marks the loop stopped if there is none.
  fn pop_or_stop(&self) -> Option<Job> {
    let mut state = self.state.lock();
    let job = state.items.pop_front();
    if job.is_none() {
      state.draining = false;
    }
    job
  }

  fn has_more_or_stop(&self) -> bool {
    let mut state = self.state.lock();
    if state.items.is_empty() {
      state.draining = false;
      false
    } else {
      true
    }
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "queued operation panicked".to_string()
  }
}

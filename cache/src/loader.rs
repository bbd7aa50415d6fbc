use crate::error::FetchError;
use crate::time;

use parking_lot::{Mutex, MutexGuard};
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// The internal state of a value being loaded.
pub(crate) enum State<V> {
  Computing,
  Complete(Result<Arc<V>, FetchError>),
}

/// The internal, mutex-protected core of the LoadFuture.
pub(crate) struct Inner<V> {
  pub(crate) state: State<V>,
  pub(crate) waiters: VecDeque<Waker>,
}

/// A future that represents a value being loaded for the cache.
/// It can be awaited by any number of tasks simultaneously, and every one of
/// them observes the same outcome.
pub(crate) struct LoadFuture<V> {
  pub(crate) inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the future, waking all waiters.
  ///
  /// Only the first completion is kept; returns `false` for later ones.
  pub fn complete(&self, result: Result<Arc<V>, FetchError>) -> bool {
    let mut inner = self.inner.lock();
    if matches!(inner.state, State::Complete(_)) {
      return false;
    }
    inner.state = State::Complete(result);
    for waker in inner.waiters.drain(..) {
      waker.wake();
    }
    true
  }
}

impl<V> Future for &LoadFuture<V> {
  type Output = Result<Arc<V>, FetchError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(result) => Poll::Ready(result.clone()),
      State::Computing => {
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
          inner.waiters.push_back(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

/// A load registered in the tracker.
pub(crate) struct PendingLoad<V> {
  pub(crate) future: Arc<LoadFuture<V>>,
  started_at: u64,
}

impl<V> PendingLoad<V> {
  pub(crate) fn new(future: Arc<LoadFuture<V>>) -> Self {
    Self {
      future,
      started_at: time::now_nanos(),
    }
  }

  fn age(&self) -> Duration {
    time::elapsed_since(self.started_at)
  }
}

pub(crate) type PendingMap<K, V, H> = HashMap<K, PendingLoad<V>, H>;

/// Tracks the single in-flight load per key.
pub(crate) struct PendingLoads<K, V, H> {
  map: Mutex<PendingMap<K, V, H>>,
}

impl<K, V, H> PendingLoads<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  pub(crate) fn new(hasher: H) -> Self {
    Self {
      map: Mutex::new(HashMap::with_hasher(hasher)),
    }
  }

  /// Locks the tracker. Checking for a pending load and registering a new
  /// one must happen under a single guard.
  pub(crate) fn lock(&self) -> MutexGuard<'_, PendingMap<K, V, H>> {
    self.map.lock()
  }

  /// Removes the entry for `key`, but only if it still belongs to `future`.
  /// A sweep may already have dropped it and a newer load taken its place.
  pub(crate) fn remove_if_same<Q>(&self, key: &Q, future: &Arc<LoadFuture<V>>) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let mut map = self.map.lock();
    match map.get(key) {
      Some(pending) if Arc::ptr_eq(&pending.future, future) => {
        map.remove(key);
        true
      }
      _ => false,
    }
  }

  /// Forgets loads older than `max_age`. Their tasks keep running and their
  /// current awaiters still receive the result.
  pub(crate) fn purge_stale(&self, max_age: Duration) -> usize {
    let mut map = self.map.lock();
    let before = map.len();
    map.retain(|_, pending| pending.age() <= max_age);
    before - map.len()
  }

  pub(crate) fn clear(&self) -> usize {
    let mut map = self.map.lock();
    let removed = map.len();
    map.clear();
    removed
  }

  pub(crate) fn len(&self) -> usize {
    self.map.lock().len()
  }
}

/// Owns the bookkeeping of one load until it settles.
///
/// Dropping the guard without calling [`LoadGuard::settle`] (a panicking
/// operation, a task torn down by its runtime) still removes the pending
/// entry and releases every awaiter with [`FetchError::Abandoned`].
pub(crate) struct LoadGuard<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  pending: Arc<PendingLoads<K, V, H>>,
  key: K,
  future: Arc<LoadFuture<V>>,
  settled: bool,
}

impl<K, V, H> LoadGuard<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  pub(crate) fn new(pending: Arc<PendingLoads<K, V, H>>, key: K, future: Arc<LoadFuture<V>>) -> Self {
    Self {
      pending,
      key,
      future,
      settled: false,
    }
  }

  pub(crate) fn key(&self) -> &K {
    &self.key
  }

  /// Clears the pending entry, then hands `result` to every awaiter.
  pub(crate) fn settle(mut self, result: Result<Arc<V>, FetchError>) {
    self.settled = true;
    self.pending.remove_if_same(&self.key, &self.future);
    self.future.complete(result);
  }
}

impl<K, V, H> Drop for LoadGuard<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    self.pending.remove_if_same(&self.key, &self.future);
    if self.future.complete(Err(FetchError::Abandoned)) {
      tracing::warn!("load abandoned before completion");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tracker() -> Arc<PendingLoads<String, u32, ahash::RandomState>> {
    Arc::new(PendingLoads::new(ahash::RandomState::new()))
  }

  #[test]
  fn dropped_guard_releases_waiters() {
    let pending = tracker();
    let future = Arc::new(LoadFuture::new());
    pending
      .lock()
      .insert("k".to_string(), PendingLoad::new(future.clone()));

    drop(LoadGuard::new(pending.clone(), "k".to_string(), future.clone()));

    assert_eq!(pending.len(), 0);
    let state = future.inner.lock();
    assert!(matches!(state.state, State::Complete(Err(FetchError::Abandoned))));
  }

  #[test]
  fn settle_keeps_a_newer_registration() {
    let pending = tracker();
    let old = Arc::new(LoadFuture::new());
    let newer = Arc::new(LoadFuture::new());
    pending
      .lock()
      .insert("k".to_string(), PendingLoad::new(newer.clone()));

    LoadGuard::new(pending.clone(), "k".to_string(), old).settle(Ok(Arc::new(1)));

    assert_eq!(pending.len(), 1);
    assert!(pending.remove_if_same("k", &newer));
  }

  #[test]
  fn only_first_completion_wins() {
    let future: LoadFuture<u32> = LoadFuture::new();
    assert!(future.complete(Ok(Arc::new(7))));
    assert!(!future.complete(Err(FetchError::Abandoned)));
    assert!(matches!(future.inner.lock().state, State::Complete(Ok(_))));
  }
}

#![allow(dead_code)]

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use futures_util::future::BoxFuture;
use request_cache::{CacheBuilder, FetchError, RequestCache};
use tokio::time::{sleep, Duration};

pub type BoxedLoad = BoxFuture<'static, Result<Payload, FetchError>>;

/// The value shape used across the facade tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
  pub v: u32,
}

pub fn payload(v: u32) -> Payload {
  Payload { v }
}

// Helper to build a cache for testing purposes. Must be called inside a
// Tokio runtime.
pub fn build_test_cache() -> RequestCache<Payload> {
  CacheBuilder::default().shards(4).build().unwrap()
}

/// Counts how many times the operations it hands out actually run.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
  pub fn calls(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }

  /// An operation that waits `delay`, then resolves to `Payload { v }`.
  pub fn slow_op(
    &self,
    delay: Duration,
    v: u32,
  ) -> impl FnOnce() -> BoxedLoad {
    let calls = self.0.clone();
    move || -> BoxedLoad {
      Box::pin(async move {
        calls.fetch_add(1, Ordering::SeqCst);
        sleep(delay).await;
        Ok(Payload { v })
      })
    }
  }

  /// An operation that waits `delay`, then fails with `error`.
  pub fn failing_op(
    &self,
    delay: Duration,
    error: FetchError,
  ) -> impl FnOnce() -> BoxedLoad {
    let calls = self.0.clone();
    move || -> BoxedLoad {
      Box::pin(async move {
        calls.fetch_add(1, Ordering::SeqCst);
        sleep(delay).await;
        Err(error)
      })
    }
  }
}

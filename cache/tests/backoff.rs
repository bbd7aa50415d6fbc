use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use request_cache::{BackoffConfig, BackoffPolicy, FetchError};
use tokio::time::{sleep, Duration};

fn status(code: u16) -> FetchError {
  FetchError::from_status(code, "")
}

// Millisecond-scale delays so the async tests stay fast.
fn fast_config() -> BackoffConfig {
  BackoffConfig {
    base_delay: Duration::from_millis(1),
    max_delay: Duration::from_millis(8),
    jitter: 0.0,
    ..BackoffConfig::default()
  }
}

#[test]
fn test_classification() {
  let policy: BackoffPolicy = BackoffPolicy::default();

  assert!(!policy.should_retry("k", &status(404)));
  assert!(!policy.should_retry("k", &status(400)));
  assert!(policy.should_retry("k", &status(429)));
  assert!(policy.should_retry("k", &status(500)));
  assert!(policy.should_retry("k", &status(503)));
  assert!(policy.should_retry("k", &FetchError::Network("connection reset".into())));
  assert!(!policy.should_retry("k", &FetchError::Decode("expected value".into())));
  assert!(!policy.should_retry("k", &FetchError::Abandoned));
}

#[test]
fn test_budget_is_exhausted_after_max_attempts() {
  let policy: BackoffPolicy = BackoffPolicy::default();
  let err = status(500);

  for attempt in 0..5 {
    assert!(policy.should_retry("k", &err), "attempt {attempt} should be allowed");
    policy.next_delay("k");
  }
  assert_eq!(policy.attempts("k"), 5);
  assert!(!policy.should_retry("k", &err));

  // Budgets are per key.
  assert!(policy.should_retry("other", &err));
}

#[test]
fn test_should_retry_does_not_record_attempts() {
  let policy: BackoffPolicy = BackoffPolicy::default();
  for _ in 0..10 {
    assert!(policy.should_retry("k", &status(500)));
  }
  assert_eq!(policy.attempts("k"), 0);
}

#[test]
fn test_permanent_errors_refused_even_with_budget() {
  let policy: BackoffPolicy = BackoffPolicy::default();
  assert!(!policy.should_retry("fresh", &status(404)));
  assert_eq!(policy.attempts("fresh"), 0);
}

#[test]
fn test_delays_are_monotonic_and_capped() {
  let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
    jitter: 0.0,
    ..BackoffConfig::default()
  });

  let mut previous = Duration::ZERO;
  for _ in 0..10 {
    let delay = policy.next_delay("k");
    assert!(delay >= previous);
    assert!(delay <= Duration::from_millis(30_000));
    previous = delay;
  }
  assert_eq!(previous, Duration::from_millis(30_000));
}

#[test]
fn test_reset_restores_budget() {
  let policy: BackoffPolicy = BackoffPolicy::default();
  let err = status(429);

  for _ in 0..5 {
    policy.next_delay("k");
  }
  assert!(!policy.should_retry("k", &err));

  policy.reset("k");
  assert_eq!(policy.attempts("k"), 0);
  assert!(policy.should_retry("k", &err));

  // After a reset the schedule starts over at the base delay.
  let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
    jitter: 0.0,
    ..BackoffConfig::default()
  });
  policy.next_delay("k");
  policy.next_delay("k");
  policy.reset("k");
  assert_eq!(policy.next_delay("k"), Duration::from_millis(1_000));
}

#[tokio::test]
async fn test_reset_window_restores_budget() {
  let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
    reset_window: Duration::from_millis(50),
    ..fast_config()
  });
  let err = status(500);

  for _ in 0..5 {
    policy.next_delay("k");
  }
  assert!(!policy.should_retry("k", &err));

  sleep(Duration::from_millis(80)).await;

  assert_eq!(policy.attempts("k"), 0);
  assert!(policy.should_retry("k", &err));
  assert_eq!(policy.next_delay("k"), Duration::from_millis(1), "schedule restarts at base");
}

#[tokio::test]
async fn test_delay_waits_and_records() {
  let policy: BackoffPolicy = BackoffPolicy::new(fast_config());

  let started = tokio::time::Instant::now();
  let first = policy.delay("k").await;
  let second = policy.delay("k").await;

  assert_eq!(first, Duration::from_millis(1));
  assert_eq!(second, Duration::from_millis(2));
  assert!(started.elapsed() >= first + second);
  assert_eq!(policy.attempts("k"), 2);
}

#[tokio::test]
async fn test_retry_until_success() {
  let policy: BackoffPolicy = BackoffPolicy::new(fast_config());
  let calls = Arc::new(AtomicUsize::new(0));

  let result = policy
    .retry("k", || {
      let calls = calls.clone();
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
          Err(status(503))
        } else {
          Ok(n)
        }
      }
    })
    .await;

  assert_eq!(result, Ok(2));
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(policy.attempts("k"), 0, "success resets the key");
}

#[tokio::test]
async fn test_retry_stops_on_permanent_error() {
  let policy: BackoffPolicy = BackoffPolicy::new(fast_config());
  let calls = Arc::new(AtomicUsize::new(0));

  let result: Result<(), FetchError> = policy
    .retry("k", || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(status(404))
      }
    })
    .await;

  assert_eq!(result.unwrap_err().status(), Some(404));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_gives_up_after_budget() {
  let policy: BackoffPolicy = BackoffPolicy::new(fast_config());
  let calls = Arc::new(AtomicUsize::new(0));

  let result: Result<(), FetchError> = policy
    .retry("k", || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(status(500))
      }
    })
    .await;

  assert_eq!(result.unwrap_err().status(), Some(500));
  // One initial call plus five retries.
  assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_stale_keys_are_dropped_when_new_keys_arrive() {
  let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
    reset_window: Duration::from_millis(30),
    ..fast_config()
  });

  policy.next_delay("a");
  policy.next_delay("b");
  assert_eq!(policy.tracked_keys(), 2);

  sleep(Duration::from_millis(60)).await;

  // A repeat attempt on a known key leaves the others alone.
  policy.next_delay("b");
  assert_eq!(policy.tracked_keys(), 2);

  policy.next_delay("c");
  assert_eq!(policy.tracked_keys(), 2, "stale \"a\" is gone, \"b\" and \"c\" remain");
  assert_eq!(policy.attempts("a"), 0);
  assert_eq!(policy.attempts("b"), 1);
}

#[tokio::test]
async fn test_purge_stale_reports_dropped_keys() {
  let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
    reset_window: Duration::from_millis(30),
    ..fast_config()
  });

  for key in ["a", "b", "c"] {
    policy.next_delay(key);
  }
  assert_eq!(policy.purge_stale(), 0);

  sleep(Duration::from_millis(60)).await;
  policy.next_delay("c");

  assert_eq!(policy.purge_stale(), 2);
  assert_eq!(policy.tracked_keys(), 1);
  assert_eq!(policy.attempts("c"), 1);
}

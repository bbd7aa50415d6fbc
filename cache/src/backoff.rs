//! Per-key exponential backoff for retrying failed loads.
//!
//! The policy only decides and waits. Re-invoking the operation belongs to
//! the caller, or to [`BackoffPolicy::retry`] when the plain loop is enough.

use crate::error::{FetchError, Result};
use crate::time;

use std::borrow::Borrow;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;
use rand::Rng;

/// Tuning for a [`BackoffPolicy`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BackoffConfig {
  /// Delay before the first retry.
  #[cfg_attr(feature = "serde", serde(rename = "base_delay_ms", with = "crate::config::millis"))]
  pub base_delay: Duration,
  /// Growth factor applied per recorded attempt.
  pub multiplier: f64,
  /// Ceiling for the un-jittered delay.
  #[cfg_attr(feature = "serde", serde(rename = "max_delay_ms", with = "crate::config::millis"))]
  pub max_delay: Duration,
  /// Retries allowed per key within one reset window.
  pub max_attempts: u32,
  /// Idle time after which a key's attempt count starts over.
  #[cfg_attr(feature = "serde", serde(rename = "reset_window_ms", with = "crate::config::millis"))]
  pub reset_window: Duration,
  /// Upper bound of the positive jitter, as a fraction of the delay.
  pub jitter: f64,
}

impl Default for BackoffConfig {
  fn default() -> Self {
    Self {
      base_delay: Duration::from_millis(1_000),
      multiplier: 2.0,
      max_delay: Duration::from_millis(30_000),
      max_attempts: 5,
      reset_window: Duration::from_millis(300_000),
      jitter: 0.2,
    }
  }
}

impl BackoffConfig {
  /// The delay for a key that has recorded `attempts` attempts, before jitter.
  pub fn base_delay_for(&self, attempts: u32) -> Duration {
    let exponent = attempts.min(i32::MAX as u32) as i32;
    let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
    let capped = raw.min(self.max_delay.as_secs_f64());
    if capped.is_finite() && capped > 0.0 {
      Duration::from_secs_f64(capped)
    } else {
      Duration::ZERO
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
struct BackoffState {
  attempts: u32,
  last_attempt_at: u64,
}

impl BackoffState {
  fn is_stale(&self, reset_window: Duration) -> bool {
    time::elapsed_since(self.last_attempt_at) > reset_window
  }
}

/// Tracks consecutive retry attempts per key.
///
/// Keys are independent. Recording an attempt happens in [`next_delay`]
/// (and therefore in [`delay`]), never in [`should_retry`].
///
/// [`next_delay`]: BackoffPolicy::next_delay
/// [`delay`]: BackoffPolicy::delay
/// [`should_retry`]: BackoffPolicy::should_retry
#[derive(Debug)]
pub struct BackoffPolicy<K = String> {
  config: BackoffConfig,
  states: Mutex<HashMap<K, BackoffState>>,
}

impl<K: Eq + Hash> Default for BackoffPolicy<K> {
  fn default() -> Self {
    Self::new(BackoffConfig::default())
  }
}

impl<K: Eq + Hash> BackoffPolicy<K> {
  pub fn new(config: BackoffConfig) -> Self {
    Self {
      config,
      states: Mutex::new(HashMap::new()),
    }
  }

  pub fn config(&self) -> &BackoffConfig {
    &self.config
  }

  /// Whether a load for `key` that failed with `error` should be retried.
  ///
  /// Permanent errors are refused whatever the remaining budget. Otherwise
  /// retry is allowed while fewer than `max_attempts` attempts have been
  /// recorded, or once the reset window has passed since the last one.
  pub fn should_retry<Q>(&self, key: &Q, error: &FetchError) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    if !error.is_retryable() {
      tracing::debug!(status = ?error.status(), "error is not retryable");
      return false;
    }

    let mut states = self.states.lock();
    let Some(state) = states.get_mut(key) else {
      return true;
    };
    if state.is_stale(self.config.reset_window) {
      *state = BackoffState::default();
      return true;
    }
    let allowed = state.attempts < self.config.max_attempts;
    if !allowed {
      tracing::debug!(attempts = state.attempts, "retry budget exhausted");
    }
    allowed
  }

  /// Computes the wait before the next attempt and records that attempt.
  pub fn next_delay<Q>(&self, key: &Q) -> Duration
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    let attempts = {
      let mut states = self.states.lock();
      // New keys are where the map grows, so stale ones are dropped there.
      if !states.contains_key(key) {
        Self::retain_fresh(&mut states, self.config.reset_window);
      }
      let state = states.entry(key.to_owned()).or_default();
      if state.is_stale(self.config.reset_window) {
        state.attempts = 0;
      }
      let attempts = state.attempts;
      state.attempts = state.attempts.saturating_add(1);
      state.last_attempt_at = time::now_nanos();
      attempts
    };

    let base = self.config.base_delay_for(attempts);
    let delay = base + self.jitter_for(base);
    tracing::debug!(attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "backing off");
    delay
  }

  /// Waits out the next backoff delay for `key`, recording the attempt.
  /// Returns how long it waited.
  pub async fn delay<Q>(&self, key: &Q) -> Duration
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
  {
    let delay = self.next_delay(key);
    tokio::time::sleep(delay).await;
    delay
  }

  /// Forgets the attempts recorded for `key`, typically after a success.
  pub fn reset<Q>(&self, key: &Q)
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.states.lock().remove(key);
  }

  /// Attempts currently counted against `key`'s budget.
  pub fn attempts<Q>(&self, key: &Q) -> u32
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self
      .states
      .lock()
      .get(key)
      .filter(|state| !state.is_stale(self.config.reset_window))
      .map_or(0, |state| state.attempts)
  }

  /// Runs `operation` until it succeeds or a retry is refused.
  ///
  /// Between attempts it waits [`delay`](Self::delay). A success resets the
  /// key; the last error is returned otherwise.
  pub async fn retry<Q, T, F, Fut>(&self, key: &Q, mut operation: F) -> Result<T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    loop {
      match operation().await {
        Ok(value) => {
          self.reset(key);
          return Ok(value);
        }
        Err(err) => {
          if !self.should_retry(key, &err) {
            return Err(err);
          }
          tracing::warn!(error = %err, "retrying failed request");
          self.delay(key).await;
        }
      }
    }
  }

  /// Drops every key whose last attempt is older than the reset window and
  /// returns how many were dropped. Such keys already count as fresh.
  pub fn purge_stale(&self) -> usize {
    Self::retain_fresh(&mut self.states.lock(), self.config.reset_window)
  }

  /// Keys currently holding backoff state, stale or not.
  pub fn tracked_keys(&self) -> usize {
    self.states.lock().len()
  }

  fn retain_fresh(states: &mut HashMap<K, BackoffState>, reset_window: Duration) -> usize {
    let before = states.len();
    states.retain(|_, state| !state.is_stale(reset_window));
    before - states.len()
  }

  fn jitter_for(&self, base: Duration) -> Duration {
    if self.config.jitter <= 0.0 || base.is_zero() {
      return Duration::ZERO;
    }
    let ratio = rand::rng().random_range(0.0..=self.config.jitter);
    base.mul_f64(ratio)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base_delay_doubles_up_to_the_ceiling() {
    let config = BackoffConfig::default();
    let expected = [1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000];
    for (attempts, ms) in expected.into_iter().enumerate() {
      assert_eq!(config.base_delay_for(attempts as u32), Duration::from_millis(ms));
    }
  }

  #[test]
  fn huge_attempt_counts_stay_capped() {
    let config = BackoffConfig::default();
    assert_eq!(config.base_delay_for(u32::MAX), Duration::from_millis(30_000));
  }

  #[test]
  fn next_delay_stays_within_jitter() {
    let policy: BackoffPolicy = BackoffPolicy::default();
    for attempts in 0..8u32 {
      let base = policy.config().base_delay_for(attempts);
      let delay = policy.next_delay("k");
      assert!(delay >= base, "attempt {attempts}: {delay:?} < {base:?}");
      assert!(
        delay <= base.mul_f64(1.2) + Duration::from_millis(1),
        "attempt {attempts}: {delay:?} too large"
      );
    }
    assert_eq!(policy.attempts("k"), 8);
  }

  #[test]
  fn zero_jitter_is_exact() {
    let policy: BackoffPolicy = BackoffPolicy::new(BackoffConfig {
      jitter: 0.0,
      ..BackoffConfig::default()
    });
    assert_eq!(policy.next_delay("k"), Duration::from_millis(1_000));
    assert_eq!(policy.next_delay("k"), Duration::from_millis(2_000));
  }
}

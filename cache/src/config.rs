//! Declarative configuration for the cache, the backoff policy and the
//! request queue.
//!
//! Durations are written in milliseconds and every field may be omitted:
//!
//! ```json
//! {
//!   "default_ttl_ms": 120000,
//!   "pending_ttl_ms": 30000,
//!   "cleanup_interval_ms": 60000,
//!   "queue_spacing_ms": 500,
//!   "backoff": { "base_delay_ms": 1000, "max_attempts": 5 }
//! }
//! ```

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;

use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_millis(120_000);
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_millis(30_000);
pub const DEFAULT_QUEUE_SPACING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
  /// TTL applied when a write does not name one.
  #[cfg_attr(feature = "serde", serde(rename = "default_ttl_ms", with = "millis"))]
  pub default_ttl: Duration,
  /// Age after which an unsettled pending load is forgotten by a sweep.
  #[cfg_attr(feature = "serde", serde(rename = "pending_ttl_ms", with = "millis"))]
  pub pending_ttl: Duration,
  /// Shard count; `None` picks one from the CPU count.
  pub shards: Option<usize>,
  /// Period of the background janitor; `None` disables it.
  #[cfg_attr(feature = "serde", serde(rename = "cleanup_interval_ms", with = "option_millis"))]
  pub cleanup_interval: Option<Duration>,
  /// Minimum gap between consecutive request-queue items.
  #[cfg_attr(feature = "serde", serde(rename = "queue_spacing_ms", with = "millis"))]
  pub queue_spacing: Duration,
  pub backoff: BackoffConfig,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl: DEFAULT_TTL,
      pending_ttl: DEFAULT_PENDING_TTL,
      shards: None,
      cleanup_interval: None,
      queue_spacing: DEFAULT_QUEUE_SPACING,
      backoff: BackoffConfig::default(),
    }
  }
}

impl CacheConfig {
  /// Parses and validates a JSON document.
  #[cfg(feature = "serde")]
  pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
    let config: Self =
      serde_json::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Rejects values that would make the cache or the policy useless.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.default_ttl.is_zero() {
      return Err(invalid("default_ttl_ms", "must be greater than zero"));
    }
    if self.pending_ttl.is_zero() {
      return Err(invalid("pending_ttl_ms", "must be greater than zero"));
    }
    if self.shards == Some(0) {
      return Err(invalid("shards", "must be greater than zero"));
    }
    if self.cleanup_interval.is_some_and(|d| d.is_zero()) {
      return Err(invalid("cleanup_interval_ms", "must be greater than zero"));
    }
    if !(self.backoff.multiplier.is_finite() && self.backoff.multiplier >= 1.0) {
      return Err(invalid("backoff.multiplier", "must be a finite number >= 1"));
    }
    if !(0.0..=1.0).contains(&self.backoff.jitter) {
      return Err(invalid("backoff.jitter", "must be between 0 and 1"));
    }
    Ok(())
  }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
  ConfigError::InvalidValue {
    field,
    message: message.to_string(),
  }
}

/// `Duration` <-> integer milliseconds.
#[cfg(feature = "serde")]
pub(crate) mod millis {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}

#[cfg(feature = "serde")]
pub(crate) mod option_millis {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Option<Duration>, D::Error> {
    Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
  }
}

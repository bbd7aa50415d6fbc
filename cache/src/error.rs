use std::fmt;

use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  ZeroShards,
  /// A default or pending time-to-live of zero was configured. Every entry
  /// would be expired the moment it was written.
  ZeroTtl,
  /// No `TaskSpawner` was configured and the builder was not called from
  /// within a Tokio runtime.
  SpawnerRequired,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::ZeroTtl => write!(f, "time-to-live cannot be zero"),
      BuildError::SpawnerRequired => write!(
        f,
        "a task spawner is required when building outside of a tokio runtime"
      ),
    }
  }
}

impl std::error::Error for BuildError {}

/// The error produced by a load operation.
///
/// A single failed load is delivered to every caller that joined it, so the
/// error is `Clone` and carries owned strings rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The server answered with a non-success status code.
  #[error("request failed with status {status}: {message}")]
  Status { status: u16, message: String },

  /// The request never produced a response (DNS, connect, reset, timeout).
  #[error("network error: {0}")]
  Network(String),

  /// A response arrived but its body could not be decoded.
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// The task running the load was torn down before it settled.
  #[error("load was abandoned before it completed")]
  Abandoned,
}

impl FetchError {
  /// Builds the error for a response that failed its status check.
  ///
  /// An empty body falls back to the canonical reason phrase.
  pub fn from_status(status: u16, body: impl Into<String>) -> Self {
    let body = body.into();
    let message = if body.trim().is_empty() {
      reason_phrase(status).to_string()
    } else {
      body
    };
    FetchError::Status { status, message }
  }

  /// The HTTP status code, when the failure came from a response.
  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether a later attempt could plausibly succeed.
  ///
  /// Network failures, 5xx and 429 are transient. Every other 4xx, decode
  /// failures and abandoned loads are permanent.
  pub fn is_retryable(&self) -> bool {
    match self {
      FetchError::Status { status, .. } => match *status {
        429 => true,
        400..=499 => false,
        _ => true,
      },
      FetchError::Network(_) => true,
      FetchError::Decode(_) | FetchError::Abandoned => false,
    }
  }
}

fn reason_phrase(status: u16) -> &'static str {
  match status {
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    429 => "Too Many Requests",
    500 => "Internal Server Error",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    504 => "Gateway Timeout",
    _ => "Unexpected Status",
  }
}

/// Errors returned to callers of [`RequestQueue::add`](crate::RequestQueue::add).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
  /// The item was discarded by `clear()` before it started.
  #[error("queued request was cancelled before it started")]
  Cancelled,

  /// The queued operation panicked while running.
  #[error("queued request panicked: {0}")]
  Failed(String),
}

/// Errors raised while reading a declarative [`CacheConfig`](crate::config::CacheConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to parse configuration: {0}")]
  Parse(String),

  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidValue { field: &'static str, message: String },
}

/// A specialized `Result` type for load operations.
pub type Result<T, E = FetchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_client_errors_as_permanent() {
    assert!(!FetchError::from_status(400, "").is_retryable());
    assert!(!FetchError::from_status(403, "").is_retryable());
    assert!(!FetchError::from_status(404, "").is_retryable());
  }

  #[test]
  fn rate_limit_and_server_errors_are_retryable() {
    assert!(FetchError::from_status(429, "slow down").is_retryable());
    assert!(FetchError::from_status(500, "").is_retryable());
    assert!(FetchError::from_status(503, "").is_retryable());
    assert!(FetchError::Network("connection reset".into()).is_retryable());
  }

  #[test]
  fn empty_body_uses_reason_phrase() {
    let err = FetchError::from_status(404, "  ");
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "request failed with status 404: Not Found");
  }
}

//! An in-process request cache for async HTTP clients.
//!
//! # Features
//! - **TTL Memoization**: Values are stored in an `Arc<V>` with a per-entry
//!   time-to-live and are never returned once expired.
//! - **Single-Flight Loads**: Concurrent misses for the same key share one
//!   in-flight operation, and its value or error fans out to every caller.
//! - **Backoff Policy**: Per-key exponential backoff with jitter that tells
//!   transient failures (network, 5xx, 429) from permanent ones.
//! - **Request Queue**: A FIFO serializer that spaces out calls to a
//!   rate-limited upstream.
//! - **Observability**: Hit/miss/dedup counters through [`RequestCache::stats`]
//!   and structured `tracing` events.
//! - **Configuration**: Optional `serde` feature for loading [`CacheConfig`]
//!   from JSON.
//!
//! ```no_run
//! use request_cache::{RequestCache, RequestDescriptor, HttpFetcher};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache: RequestCache<serde_json::Value> = RequestCache::builder().build()?;
//! let fetcher = HttpFetcher::with_user_agent("feed-reader/0.1")?;
//!
//! let request = RequestDescriptor::get("https://www.reddit.com/r/rust/hot.json");
//! let listing = cache
//!   .fetch_with_cache(&request, Some(Duration::from_secs(60)), &fetcher)
//!   .await?;
//! println!("{}", listing);
//! # Ok(())
//! # }
//! ```

// Public modules that form the API
pub mod backoff;
pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handles;
pub mod key;
pub mod metrics;
pub mod queue;
pub mod runtime;

// Internal, crate-only modules
mod entry;
mod loader;
mod shared;
mod store;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use backoff::{BackoffConfig, BackoffPolicy};
pub use builder::CacheBuilder;
pub use config::CacheConfig;
pub use error::{BuildError, ConfigError, FetchError, QueueError};
pub use fetch::Fetch;
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use handles::RequestCache;
pub use key::{Method, RequestDescriptor};
pub use metrics::CacheStats;
pub use queue::RequestQueue;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use task::janitor::SweepReport;

mod common;

use common::{build_test_cache, payload, CallCounter};
use tokio::time::Duration;

#[tokio::test]
async fn test_fresh_cache_reports_zero() {
  let cache = build_test_cache();
  let stats = cache.stats();

  assert_eq!(stats.hits, 0);
  assert_eq!(stats.misses, 0);
  assert_eq!(stats.requests, 0);
  assert_eq!(stats.deduplicated, 0);
  assert_eq!(stats.cache_size, 0);
  assert_eq!(stats.pending_requests, 0);
  assert_eq!(stats.hit_ratio, "0%");
}

#[tokio::test]
async fn test_counters_are_consistent() {
  let cache = build_test_cache();
  cache.insert("a", payload(1));

  // 2 hits, 1 miss.
  cache.get("a");
  cache.get("a");
  cache.get("b");

  let stats = cache.stats();
  assert_eq!(stats.hits, 2);
  assert_eq!(stats.misses, 1);
  assert_eq!(stats.requests, stats.hits + stats.misses);
  assert_eq!(
    stats.hit_ratio,
    format!("{:.2}%", stats.hits as f64 / stats.requests as f64 * 100.0)
  );
  assert_eq!(stats.hit_ratio, "66.67%");
}

#[tokio::test]
async fn test_pending_requests_reflect_in_flight_loads() {
  let cache = build_test_cache();
  let counter = CallCounter::default();

  let task = {
    let cache = cache.clone();
    let op = counter.slow_op(Duration::from_millis(60), 1);
    tokio::spawn(async move { cache.deduplicate("k", Duration::from_secs(1), op).await })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;

  assert_eq!(cache.stats().pending_requests, 1);

  task.await.unwrap().unwrap();
  let stats = cache.stats();
  assert_eq!(stats.pending_requests, 0);
  assert_eq!(stats.cache_size, 1);
}

#[tokio::test]
async fn test_stats_serialize_camel_case() {
  let cache = build_test_cache();
  cache.insert("a", payload(1));
  cache.get("a");

  let json = serde_json::to_value(cache.stats()).unwrap();
  assert_eq!(json["hits"], 1);
  assert_eq!(json["cacheSize"], 1);
  assert_eq!(json["pendingRequests"], 0);
  assert_eq!(json["hitRatio"], "100.00%");
}

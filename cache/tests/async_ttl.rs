mod common;

use common::{build_test_cache, payload, CallCounter, Payload};
use request_cache::{CacheBuilder, RequestCache};
use tokio::time::{sleep, Duration};

const TINY_TTL: Duration = Duration::from_millis(100);
const SLEEP_MARGIN: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_item_expires_after_ttl() {
  let cache = build_test_cache();

  cache.insert_with_ttl("A", payload(1), TINY_TTL);

  // 1. Immediately after insert, the value should be present.
  assert_eq!(*cache.get("A").unwrap(), payload(1));
  let misses_before = cache.stats().misses;

  // 2. Wait for a duration longer than the TTL.
  sleep(TINY_TTL + SLEEP_MARGIN).await;

  // 3. The expired entry is never returned and counts as a miss.
  assert!(cache.get("A").is_none(), "Item should have expired");
  let stats = cache.stats();
  assert_eq!(stats.misses, misses_before + 1);
  assert_eq!(stats.expired, 1);
  assert_eq!(stats.cache_size, 0);
}

#[tokio::test]
async fn test_ttl_is_not_reset_on_access() {
  let cache = build_test_cache();
  cache.insert_with_ttl("key", payload(1), Duration::from_millis(200));

  sleep(Duration::from_millis(120)).await;
  assert!(cache.get("key").is_some());

  sleep(Duration::from_millis(120)).await;
  assert!(cache.get("key").is_none(), "Reads must not extend the TTL");
}

#[tokio::test]
async fn test_insert_uses_default_ttl() {
  let cache: RequestCache<Payload> = CacheBuilder::default()
    .default_ttl(TINY_TTL)
    .build()
    .unwrap();

  cache.insert("k", payload(1));
  assert!(cache.get("k").is_some());

  sleep(TINY_TTL + SLEEP_MARGIN).await;
  assert!(cache.get("k").is_none());
}

#[tokio::test]
async fn test_stats_sweeps_expired_entries() {
  let cache = build_test_cache();
  cache.insert_with_ttl("short", payload(1), TINY_TTL);
  cache.insert_with_ttl("long", payload(2), Duration::from_secs(60));
  assert_eq!(cache.len(), 2);

  sleep(TINY_TTL + SLEEP_MARGIN).await;

  // Nobody read "short", but stats() sweeps before measuring.
  let stats = cache.stats();
  assert_eq!(stats.cache_size, 1);
  assert_eq!(stats.expired, 1);
  assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_janitor_purges_in_background() {
  let cache: RequestCache<Payload> = CacheBuilder::default()
    .cleanup_interval(Duration::from_millis(20))
    .build()
    .unwrap();

  cache.insert_with_ttl("k", payload(1), TINY_TTL);
  sleep(TINY_TTL + SLEEP_MARGIN * 2).await;

  assert_eq!(cache.len(), 0, "Janitor should have removed the entry");
}

#[tokio::test]
async fn test_deduplicated_value_expires_and_reloads() {
  let cache = build_test_cache();
  let counter = CallCounter::default();

  let first = cache
    .deduplicate("k", TINY_TTL, counter.slow_op(Duration::ZERO, 1))
    .await
    .unwrap();
  assert_eq!(*first, payload(1));

  // Within TTL: served from the cache.
  let cached = cache
    .deduplicate("k", TINY_TTL, counter.slow_op(Duration::ZERO, 2))
    .await
    .unwrap();
  assert_eq!(*cached, payload(1));
  assert_eq!(counter.calls(), 1);

  sleep(TINY_TTL + SLEEP_MARGIN).await;

  let reloaded = cache
    .deduplicate("k", TINY_TTL, counter.slow_op(Duration::ZERO, 2))
    .await
    .unwrap();
  assert_eq!(*reloaded, payload(2));
  assert_eq!(counter.calls(), 2);
}

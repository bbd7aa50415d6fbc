use request_cache::{
  BackoffPolicy, CacheConfig, FetchError, RequestCache, RequestDescriptor, RequestQueue,
};
use serde_json::{json, Value};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

// A simulated listing endpoint: fails twice with 503, then answers.
async fn fetch_listing(request: RequestDescriptor, calls: Arc<AtomicUsize>) -> Result<Value, FetchError> {
  let n = calls.fetch_add(1, Ordering::SeqCst);
  println!("--- Upstream: {} {} (call #{})", request.method, request.url, n + 1);
  sleep(Duration::from_millis(200)).await;
  if n < 2 {
    return Err(FetchError::from_status(503, ""));
  }
  Ok(json!({ "kind": "Listing", "url": request.url, "children": [] }))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("request_cache=debug")))
    .init();

  let config = CacheConfig::from_json_str(
    r#"{ "default_ttl_ms": 60000, "queue_spacing_ms": 200,
         "backoff": { "base_delay_ms": 100, "max_delay_ms": 400 } }"#,
  )
  .expect("Invalid config");

  let cache: RequestCache<Value> = RequestCache::builder()
    .config(&config)
    .build()
    .expect("Failed to build cache");
  let backoff: BackoffPolicy = BackoffPolicy::new(config.backoff.clone());
  let queue = RequestQueue::from_config(&config);
  let calls = Arc::new(AtomicUsize::new(0));

  let request = RequestDescriptor::get("https://www.reddit.com/r/rust/hot.json");
  let key = request.cache_key();

  println!("--- Fetch with retry ---");
  let listing = backoff
    .retry(&key, || {
      let fetcher = {
        let calls = calls.clone();
        move |request: &RequestDescriptor| fetch_listing(request.clone(), calls.clone())
      };
      let cache = cache.clone();
      let request = request.clone();
      async move { cache.fetch_with_cache(&request, None, &fetcher).await }
    })
    .await
    .expect("Listing should eventually load");
  println!("Received: {}", listing);

  println!("\n--- Concurrent readers share the cached listing ---");
  let mut tasks = Vec::new();
  for i in 0..5 {
    let cache = cache.clone();
    let key = key.clone();
    tasks.push(tokio::spawn(async move {
      let hit = cache.get(&key).is_some();
      println!("[Reader {}] cache hit: {}", i, hit);
    }));
  }
  for task in tasks {
    task.await.unwrap();
  }

  println!("\n--- Rate-limited submissions through the queue ---");
  let mut submissions = Vec::new();
  for i in 0..3 {
    let queue = queue.clone();
    submissions.push(tokio::spawn(async move {
      queue
        .add(move || async move {
          println!("[Queue] submitting vote {}", i);
          i
        })
        .await
    }));
  }
  for submission in submissions {
    let _ = submission.await.unwrap();
  }

  println!("\n--- Verification ---");
  println!("Upstream calls: {}", calls.load(Ordering::SeqCst));
  println!("{:#?}", cache.stats());
}

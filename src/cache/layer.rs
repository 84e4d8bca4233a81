//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::freshness::{Freshness, DEFAULT_STALE_RATIO};
use super::key::{self, CacheKey, Dataset, IdentityFingerprint};
use super::retry::{retry, RetryPolicy};
use super::storage::{CacheStorage, MemoryStorage, NoopStorage};
use super::traits::{CacheResult, Cacheable, FetchError, FetchOutcome};

/// One producer run, shared by everyone waiting on the same key.
type SharedFetch = Shared<BoxFuture<'static, std::result::Result<Value, FetchError>>>;

/// Last successfully fetched value of a key, kept past TTL expiry.
#[derive(Debug, Clone)]
struct LastKnown {
  data: Value,
  timestamp: i64,
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// serving cached data immediately while refreshing it in the background,
/// and falling back to the last known data when the network fails.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
  /// Fraction of the TTL after which a hit triggers a background refresh
  stale_ratio: f64,
  retry_policy: RetryPolicy,
  /// Whether failed fetches may fall back to expired data
  retain_last_known: bool,
  last_known: Arc<Mutex<HashMap<String, LastKnown>>>,
  in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      stale_ratio: DEFAULT_STALE_RATIO,
      retry_policy: RetryPolicy::default(),
      retain_last_known: true,
      last_known: Arc::new(Mutex::new(HashMap::new())),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// In-memory cache on the system clock.
  pub fn in_memory() -> Self {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Self::new(Arc::new(MemoryStorage::new(clock.clone())), clock)
  }

  /// A layer that caches nothing: every call goes to the producer.
  pub fn disabled() -> Self {
    Self::new(Arc::new(NoopStorage), Arc::new(SystemClock)).with_last_known(false)
  }

  /// Set the fraction of the TTL after which cached data is stale.
  pub fn with_stale_ratio(mut self, stale_ratio: f64) -> Self {
    self.stale_ratio = stale_ratio;
    self
  }

  pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
    self.retry_policy = retry_policy;
    self
  }

  /// Keep (or not) the last fetched value of each key as a failure fallback.
  pub fn with_last_known(mut self, retain: bool) -> Self {
    self.retain_last_known = retain;
    self
  }

  /// Fetch with stale-while-revalidate semantics.
  ///
  /// 1. Fresh hit - return immediately, no network call
  /// 2. Stale hit - return immediately and refresh in the background
  /// 3. Miss or expired - fetch with retries and wait for the result
  /// 4. On fetch failure, serve the last known data if there is any
  pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, producer: F) -> FetchOutcome<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let cached = self.storage.get(key.as_str()).unwrap_or_else(|e| {
      warn!(key = %key, error = %e, "cache read failed, treating as miss");
      None
    });

    if let Some(entry) = cached {
      let freshness = Freshness::classify(&entry, self.clock.now_millis(), self.stale_ratio);

      match (freshness, decode::<T>(&entry.data)) {
        (Freshness::Fresh, Ok(data)) => {
          debug!(key = %key, "cache hit");
          return FetchOutcome::Fresh(CacheResult::from_cache(data, entry.timestamp, false));
        }
        (Freshness::Stale, Ok(data)) => {
          debug!(key = %key, "stale cache hit, refreshing in background");
          self.refresh_in_background(key, ttl, producer);
          return FetchOutcome::StaleServing(CacheResult::from_cache(data, entry.timestamp, true));
        }
        (Freshness::Expired, _) => {}
        (_, Err(e)) => warn!(key = %key, error = %e, "cached payload unreadable, refetching"),
      }
    } else {
      debug!(key = %key, "cache miss");
    }

    self.fetch_and_wait(key, ttl, producer).await
  }

  /// Drop the cached entry and fetch again, waiting for the result.
  pub async fn force_refresh<T, F, Fut>(
    &self,
    key: &CacheKey,
    ttl: Duration,
    producer: F,
  ) -> FetchOutcome<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    if let Err(e) = self.invalidate(key) {
      warn!(key = %key, error = %e, "failed to invalidate before refresh");
    }
    self.fetch_and_wait(key, ttl, producer).await
  }

  /// Number of entries currently held by the storage backend.
  pub fn cached_entries(&self) -> Result<usize> {
    self.storage.len()
  }

  /// Remove one key from the cache. The last known value is kept.
  pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
    let removed = self.storage.delete(key.as_str())?;
    debug!(key = %key, removed, "invalidated");
    Ok(removed)
  }

  /// Remove every variant of a dataset cached for one identity.
  pub fn invalidate_dataset(&self, dataset: Dataset, identity: &IdentityFingerprint) -> Result<usize> {
    let removed = self
      .storage
      .delete_prefix(&key::dataset_prefix(dataset, identity))?;
    debug!(%dataset, removed, "invalidated dataset");
    Ok(removed)
  }

  /// Drop everything cached for an identity, including last known values.
  pub fn forget_identity(&self, identity: &IdentityFingerprint) -> Result<usize> {
    let mut removed = 0;
    for dataset in Dataset::ALL {
      removed += self.invalidate_dataset(dataset, identity)?;
    }

    lock_recovering(&self.last_known).retain(|k, _| !key::belongs_to(k, identity));

    info!(removed, "forgot cached data for identity");
    Ok(removed)
  }

  async fn fetch_and_wait<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, producer: F) -> FetchOutcome<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let result = self.start_fetch(key, ttl, producer).await;

    let err = match result.and_then(|value| decode::<T>(&value).map_err(FetchError::new)) {
      Ok(data) => return FetchOutcome::Fresh(CacheResult::from_network(data)),
      Err(err) => err,
    };

    match self.last_known::<T>(key) {
      Some((data, timestamp)) => {
        warn!(key = %key, error = %err, "fetch failed, serving last known data");
        FetchOutcome::Degraded(CacheResult::offline(data, timestamp), err)
      }
      None => {
        warn!(key = %key, error = %err, "fetch failed with nothing cached");
        FetchOutcome::Failed(err)
      }
    }
  }

  fn refresh_in_background<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, producer: F)
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let fetch = self.start_fetch(key, ttl, producer);
    let key = key.to_string();
    tokio::spawn(async move {
      // The caller already has data; failures only get logged
      if let Err(err) = fetch.await {
        warn!(key = %key, error = %err, "background refresh failed");
      }
    });
  }

  /// Start a producer run for `key`, or join the one already running.
  fn start_fetch<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, producer: F) -> SharedFetch
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let mut in_flight = lock_recovering(&self.in_flight);

    if let Some(existing) = in_flight.get(key.as_str()) {
      debug!(key = %key, "joining in-flight fetch");
      return existing.clone();
    }

    let key = key.to_string();
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    let storage = Arc::clone(&self.storage);
    let clock = Arc::clone(&self.clock);
    let last_known = self.retain_last_known.then(|| Arc::clone(&self.last_known));
    let registry = Arc::clone(&self.in_flight);
    let policy = self.retry_policy;
    let task_key = key.clone();

    let fetch = async move {
      let key = task_key;
      info!(key = %key, "fetching from upstream");

      let result = retry(&policy, || producer()).await.and_then(|data| {
        serde_json::to_value(&data).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))
      });

      let result = match result {
        Ok(value) => {
          if let Err(e) = storage.set(&key, value.clone(), ttl_ms, None) {
            warn!(key = %key, error = %e, "failed to store fetched data");
          }
          if let Some(last_known) = &last_known {
            let timestamp = clock.now_millis();
            lock_recovering(last_known).insert(
              key.clone(),
              LastKnown {
                data: value.clone(),
                timestamp,
              },
            );
          }
          Ok(value)
        }
        Err(e) => Err(FetchError::new(e)),
      };

      lock_recovering(&registry).remove(&key);
      result
    }
    .boxed()
    .shared();

    in_flight.insert(key, fetch.clone());
    fetch
  }

  fn last_known<T: Cacheable>(&self, key: &CacheKey) -> Option<(T, i64)> {
    if !self.retain_last_known {
      return None;
    }
    let entry = lock_recovering(&self.last_known).get(key.as_str()).cloned()?;
    let data = decode::<T>(&entry.data).ok()?;
    Some((data, entry.timestamp))
  }
}

/// Lock a bookkeeping map even if a panicking thread poisoned it.
///
/// Entries are inserted and removed whole, so the map is consistent after a panic.
/// A registry entry that is never removed would replay its result forever.
fn lock_recovering<V>(map: &Mutex<HashMap<String, V>>) -> MutexGuard<'_, HashMap<String, V>> {
  map.lock().unwrap_or_else(|e| {
    warn!("recovering poisoned cache lock");
    PoisonError::into_inner(e)
  })
}

fn decode<T: Cacheable>(value: &Value) -> Result<T> {
  serde_json::from_value(value.clone()).map_err(|e| eyre!("Failed to decode cached payload: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::ManualClock;
  use crate::cache::key::{build_key, KeyParams};
  use crate::cache::retry::retry_all;
  use crate::cache::traits::{CacheSource, FetchSignal};
  use std::sync::atomic::{AtomicU32, Ordering};
  use tokio::sync::Notify;

  const TTL: Duration = Duration::from_millis(1_000);

  fn test_layer() -> (CacheLayer, ManualClock) {
    let clock = ManualClock::new(0);
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let layer = CacheLayer::new(Arc::new(MemoryStorage::new(shared.clone())), shared)
      .with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_jitter: Duration::ZERO,
        retry_if: retry_all,
      });
    (layer, clock)
  }

  fn repos_key(fp: &str) -> CacheKey {
    build_key(Dataset::Repos, &KeyParams::new(), &IdentityFingerprint::new(fp))
  }

  /// Waits for every fetch currently running.
  async fn settle(layer: &CacheLayer) {
    let running: Vec<SharedFetch> = layer.in_flight.lock().unwrap().values().cloned().collect();
    futures::future::join_all(running).await;
  }

  fn counting_producer(
    calls: &Arc<AtomicU32>,
    value: &'static str,
  ) -> impl Fn() -> futures::future::Ready<Result<String>> + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      futures::future::ready(Ok(value.to_string()))
    }
  }

  fn failing_producer(
    calls: &Arc<AtomicU32>,
  ) -> impl Fn() -> futures::future::Ready<Result<String>> + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      futures::future::ready(Err(eyre!("upstream unavailable")))
    }
  }

  #[tokio::test]
  async fn miss_fetches_then_serves_from_cache() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));
    let key = repos_key("a");

    let first = layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    assert_eq!(first.signal(), FetchSignal::FreshResult);
    assert_eq!(first.result().unwrap().source, CacheSource::Network);

    let second = layer.fetch(&key, TTL, counting_producer(&calls, "v2")).await;
    let result = second.into_result().unwrap();
    assert_eq!(result.data, "v1");
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn stale_hit_returns_before_refresh_completes() {
    let (layer, clock) = test_layer();
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    clock.advance(850);

    let gate = Arc::new(Notify::new());
    let refreshed = Arc::new(AtomicU32::new(0));
    let producer = {
      let gate = gate.clone();
      let refreshed = refreshed.clone();
      move || {
        let gate = gate.clone();
        let refreshed = refreshed.clone();
        async move {
          gate.notified().await;
          refreshed.fetch_add(1, Ordering::SeqCst);
          Ok("v2".to_string())
        }
      }
    };

    let outcome = layer.fetch(&key, TTL, producer).await;
    assert_eq!(outcome.signal(), FetchSignal::StaleResultBackgroundRefreshing);
    assert_eq!(outcome.data().map(String::as_str), Some("v1"));
    assert_eq!(refreshed.load(Ordering::SeqCst), 0);

    gate.notify_one();
    settle(&layer).await;
    assert_eq!(refreshed.load(Ordering::SeqCst), 1);

    let after = layer.fetch(&key, TTL, counting_producer(&calls, "v3")).await;
    assert_eq!(after.data().map(String::as_str), Some("v2"));
    assert_eq!(after.result().unwrap().source, CacheSource::CacheFresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn profile_ttl_scenario() {
    let (layer, clock) = test_layer();
    let layer = layer.with_retry_policy(RetryPolicy {
      max_attempts: 1,
      ..RetryPolicy::default()
    });
    let key = build_key(
      Dataset::Profile,
      &KeyParams::new(),
      &IdentityFingerprint::new("a"),
    );
    let ttl = Duration::from_millis(3_600_000);
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, ttl, counting_producer(&calls, "octocat")).await;

    clock.set(2_900_001);
    let background = Arc::new(AtomicU32::new(0));
    let outcome = layer.fetch(&key, ttl, failing_producer(&background)).await;
    assert_eq!(outcome.signal(), FetchSignal::StaleResultBackgroundRefreshing);
    settle(&layer).await;
    assert_eq!(background.load(Ordering::SeqCst), 1);

    clock.set(3_600_001);
    assert!(layer.storage.get(key.as_str()).unwrap().is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn expired_entry_with_failing_fetch_degrades_to_last_known() {
    let (layer, clock) = test_layer();
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    clock.advance(5_000);

    let failures = Arc::new(AtomicU32::new(0));
    let outcome = layer.fetch(&key, TTL, failing_producer(&failures)).await;

    assert_eq!(failures.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.signal(), FetchSignal::CachedResultDueToFetchFailure);
    let result = outcome.result().unwrap();
    assert_eq!(result.data, "v1");
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.cached_at.unwrap().timestamp_millis(), 0);
    assert!(outcome
      .error()
      .unwrap()
      .to_string()
      .contains("upstream unavailable"));
  }

  #[tokio::test(start_paused = true)]
  async fn expired_entry_without_retention_is_never_used() {
    let (layer, clock) = test_layer();
    let layer = layer.with_last_known(false);
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    clock.advance(5_000);

    let outcome = layer.fetch(&key, TTL, failing_producer(&calls)).await;
    assert_eq!(outcome.signal(), FetchSignal::HardFailureNoCache);
    assert!(outcome.data().is_none());
    assert_eq!(layer.storage.len().unwrap(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn miss_with_failing_fetch_propagates_after_retries() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));

    let outcome = layer
      .fetch(&repos_key("a"), TTL, failing_producer(&calls))
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let err = outcome.into_result().unwrap_err();
    assert!(err.to_string().contains("upstream unavailable"));
  }

  #[tokio::test]
  async fn concurrent_misses_share_one_fetch() {
    let (layer, _) = test_layer();
    let key = repos_key("a");
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicU32::new(0));

    let producer = {
      let gate = gate.clone();
      let calls = calls.clone();
      move || {
        let gate = gate.clone();
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
          gate.notified().await;
          Ok(vec![1u32, 2, 3])
        }
      }
    };

    let (a, b, _) = futures::join!(
      layer.fetch(&key, TTL, producer.clone()),
      layer.fetch(&key, TTL, producer),
      async { gate.notify_one() }
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.data(), Some(&vec![1, 2, 3]));
    assert_eq!(b.data(), Some(&vec![1, 2, 3]));
    assert!(layer.in_flight.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn concurrent_stale_reads_start_one_refresh() {
    let (layer, clock) = test_layer();
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    clock.advance(900);

    let gate = Arc::new(Notify::new());
    let refreshes = Arc::new(AtomicU32::new(0));
    let producer = {
      let gate = gate.clone();
      let refreshes = refreshes.clone();
      move || {
        let gate = gate.clone();
        refreshes.fetch_add(1, Ordering::SeqCst);
        async move {
          gate.notified().await;
          Ok("v2".to_string())
        }
      }
    };

    for _ in 0..3 {
      let outcome = layer.fetch(&key, TTL, producer.clone()).await;
      assert_eq!(outcome.signal(), FetchSignal::StaleResultBackgroundRefreshing);
    }

    gate.notify_one();
    settle(&layer).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn force_refresh_skips_fresh_entry() {
    let (layer, _) = test_layer();
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    let outcome = layer
      .force_refresh(&key, TTL, counting_producer(&calls, "v2"))
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let result = outcome.into_result().unwrap();
    assert_eq!(result.data, "v2");
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_force_refresh_keeps_last_known() {
    let (layer, _) = test_layer();
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    let outcome = layer.force_refresh(&key, TTL, failing_producer(&calls)).await;

    assert_eq!(outcome.signal(), FetchSignal::CachedResultDueToFetchFailure);
    assert_eq!(outcome.data().map(String::as_str), Some("v1"));
  }

  #[tokio::test]
  async fn background_failure_keeps_serving_cached_value() {
    let (layer, clock) = test_layer();
    let layer = layer.with_retry_policy(RetryPolicy {
      max_attempts: 1,
      ..RetryPolicy::default()
    });
    let key = repos_key("a");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    clock.advance(900);

    let failures = Arc::new(AtomicU32::new(0));
    let outcome = layer.fetch(&key, TTL, failing_producer(&failures)).await;
    assert_eq!(outcome.data().map(String::as_str), Some("v1"));
    settle(&layer).await;

    let again = layer.fetch(&key, TTL, failing_producer(&failures)).await;
    assert_eq!(again.signal(), FetchSignal::StaleResultBackgroundRefreshing);
    assert_eq!(again.data().map(String::as_str), Some("v1"));
    settle(&layer).await;
    assert_eq!(failures.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn disabled_layer_always_calls_producer() {
    let layer = CacheLayer::disabled();
    let key = repos_key("anon");
    let calls = Arc::new(AtomicU32::new(0));

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn identities_do_not_share_entries() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));

    layer
      .fetch(&repos_key("alice"), TTL, counting_producer(&calls, "alice"))
      .await;
    let bob = layer
      .fetch(&repos_key("bob"), TTL, counting_producer(&calls, "bob"))
      .await;

    assert_eq!(bob.data().map(String::as_str), Some("bob"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn forget_identity_drops_entries_and_fallbacks() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));
    let alice = IdentityFingerprint::new("alice");

    layer
      .fetch(&repos_key("alice"), TTL, counting_producer(&calls, "a"))
      .await;
    layer
      .fetch(&repos_key("bob"), TTL, counting_producer(&calls, "b"))
      .await;

    assert_eq!(layer.forget_identity(&alice).unwrap(), 1);
    assert_eq!(layer.storage.len().unwrap(), 1);

    let outcome = layer
      .fetch(&repos_key("alice"), TTL, failing_producer(&calls))
      .await;
    assert_eq!(outcome.signal(), FetchSignal::HardFailureNoCache);
  }

  #[tokio::test]
  async fn invalidate_dataset_removes_all_variants() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));
    let fp = IdentityFingerprint::new("a");

    for state in ["open", "closed"] {
      let key = build_key(
        Dataset::PullRequests,
        &KeyParams::new().with("state", state),
        &fp,
      );
      layer.fetch(&key, TTL, counting_producer(&calls, "prs")).await;
    }
    layer
      .fetch(&repos_key("a"), TTL, counting_producer(&calls, "repos"))
      .await;

    assert_eq!(layer.invalidate_dataset(Dataset::PullRequests, &fp).unwrap(), 2);
    assert_eq!(layer.storage.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn poisoned_registry_still_releases_finished_fetches() {
    let (layer, _) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));
    let key = repos_key("a");

    let registry = layer.in_flight.clone();
    let _ = std::thread::spawn(move || {
      let _guard = registry.lock().unwrap();
      panic!("poison the registry");
    })
    .join();
    assert!(layer.in_flight.is_poisoned());

    layer.fetch(&key, TTL, counting_producer(&calls, "v1")).await;
    layer.invalidate(&key).unwrap();
    let outcome = layer.fetch(&key, TTL, counting_producer(&calls, "v2")).await;

    assert_eq!(outcome.data().map(String::as_str), Some("v2"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(lock_recovering(&layer.in_flight).is_empty());
  }

  #[tokio::test]
  async fn oversized_ttl_saturates_instead_of_expiring() {
    let (layer, clock) = test_layer();
    let calls = Arc::new(AtomicU32::new(0));
    let key = repos_key("a");

    layer
      .fetch(&key, Duration::MAX, counting_producer(&calls, "v1"))
      .await;
    clock.advance(365 * 24 * 3_600 * 1_000);

    let outcome = layer
      .fetch(&key, Duration::MAX, counting_producer(&calls, "v2"))
      .await;
    assert_eq!(outcome.result().unwrap().source, CacheSource::CacheFresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(layer.cached_entries().unwrap(), 1);
  }
}

use color_eyre::Result;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::QueryConfig;
use super::driver::{derive_state, Fetcher, Generation, Publisher, QueryDriver, Trigger};
use super::handle::QueryHandle;
use super::state::QueryState;
use crate::cache::{CacheResult, CacheStore, QueryData};
use crate::error::{FetchError, QueryError};
use crate::fetch;
use crate::signals::LifecycleSignals;

/// Client-wide switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
  /// Queue mutations on the same key instead of letting them overlap
  pub serialize_mutations: bool,
}

/// An active key: its driver and everyone watching it.
struct Registration {
  subscribers: usize,
  generation: Generation,
  triggers: mpsc::UnboundedSender<Trigger>,
  /// `Publisher<T>` for the `T` the key was first subscribed with
  publisher: Box<dyn Any + Send + Sync>,
  driver: JoinHandle<()>,
  cache_time: Option<Duration>,
}

struct ClientInner {
  store: Arc<CacheStore>,
  queries: Mutex<HashMap<String, Registration>>,
  signals: LifecycleSignals,
  options: ClientOptions,
  /// Key → lease of the eviction countdown currently allowed to fire
  evictions: Mutex<HashMap<String, u64>>,
  next_lease: AtomicU64,
  mutation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Entry point of the sync engine: owns the cache and the registry of
/// active queries. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<ClientInner>,
}

impl QueryClient {
  pub fn new(signals: LifecycleSignals) -> Self {
    Self::with_options(signals, ClientOptions::default())
  }

  pub fn with_options(signals: LifecycleSignals, options: ClientOptions) -> Self {
    Self {
      inner: Arc::new(ClientInner {
        store: Arc::new(CacheStore::new()),
        queries: Mutex::new(HashMap::new()),
        signals,
        options,
        evictions: Mutex::new(HashMap::new()),
        next_lease: AtomicU64::new(0),
        mutation_locks: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn store(&self) -> &CacheStore {
    &self.inner.store
  }

  pub fn signals(&self) -> &LifecycleSignals {
    &self.inner.signals
  }

  pub fn options(&self) -> ClientOptions {
    self.inner.options
  }

  /// Subscribe to `key`.
  ///
  /// The returned handle already carries the state derivable from the
  /// cache: fresh data is served as-is, stale data is served with
  /// `is_loading`, and nothing cached means pending. Either way a
  /// background refresh starts. Must be called within a Tokio runtime.
  ///
  /// The first subscriber's fetcher and config drive the key until the
  /// last handle is dropped.
  pub fn use_query<T, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    config: QueryConfig,
  ) -> Result<QueryHandle<T>, QueryError>
  where
    T: QueryData,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.cancel_eviction(key);
    let mut queries = lock(&self.inner.queries);

    if let Some(registration) = queries.get_mut(key) {
      let publisher = registration
        .publisher
        .downcast_ref::<Publisher<T>>()
        .ok_or_else(|| QueryError::TypeMismatch { key: key.to_string() })?;
      let receiver = publisher.subscribe();
      registration.subscribers += 1;
      let _ = registration.triggers.send(Trigger::Mount);
      debug!(key, subscribers = registration.subscribers, "Joined active query");
      return Ok(QueryHandle::new(key, receiver, self.clone()));
    }

    let fetcher: Fetcher<T> = Arc::new(move || fetcher().boxed());
    let initial = derive_state::<T>(&self.inner.store, key, config.stale_time);
    let (publisher, receiver) = watch::channel(initial);
    let publisher: Publisher<T> = Arc::new(publisher);
    let (triggers, trigger_rx) = mpsc::unbounded_channel();
    let generation = Generation::default();
    let cache_time = config.cache_time;

    let driver = QueryDriver {
      key: key.to_string(),
      config,
      fetcher,
      store: Arc::clone(&self.inner.store),
      publisher: Arc::clone(&publisher),
      generation: generation.clone(),
      triggers: trigger_rx,
      focus: self.inner.signals.subscribe_focus(),
      reconnect: self.inner.signals.subscribe_reconnect(),
    };

    queries.insert(
      key.to_string(),
      Registration {
        subscribers: 1,
        generation,
        triggers,
        publisher: Box::new(publisher),
        driver: tokio::spawn(driver.run()),
        cache_time,
      },
    );
    info!(key, "Query subscribed");

    Ok(QueryHandle::new(key, receiver, self.clone()))
  }

  pub(crate) fn unsubscribe(&self, key: &str) {
    let removed = {
      let mut queries = lock(&self.inner.queries);
      let Some(registration) = queries.get_mut(key) else {
        return;
      };
      registration.subscribers = registration.subscribers.saturating_sub(1);
      if registration.subscribers > 0 {
        debug!(key, subscribers = registration.subscribers, "Subscriber left");
        return;
      }
      queries.remove(key)
    };

    if let Some(registration) = removed {
      registration.driver.abort();
      info!(key, "Last subscriber left, query stopped");
      if let Some(cache_time) = registration.cache_time {
        self.schedule_eviction(key, cache_time);
      }
    }
  }

  /// Mark `key` stale and refresh it now if anyone is watching.
  ///
  /// An in-flight fetch for the key is cancelled and restarted. Without
  /// subscribers this does nothing: the next subscription refreshes anyway.
  pub fn invalidate(&self, key: &str) {
    let queries = lock(&self.inner.queries);
    match queries.get(key) {
      Some(registration) => {
        debug!(key, "Invalidating query");
        let _ = registration.triggers.send(Trigger::Invalidate);
      }
      None => debug!(key, "Invalidated query has no subscribers"),
    }
  }

  pub fn invalidate_all(&self) {
    let queries = lock(&self.inner.queries);
    for (key, registration) in queries.iter() {
      debug!(key, "Invalidating query");
      let _ = registration.triggers.send(Trigger::Invalidate);
    }
  }

  /// Read the cache directly, ignoring freshness.
  pub fn get_query_data<T: QueryData>(&self, key: &str) -> Option<T> {
    self.inner.store.get::<T>(key).map(|entry| entry.value)
  }

  /// Write the cache directly and publish the value to subscribers.
  ///
  /// A fetch already in flight for the key can no longer overwrite it.
  pub fn set_query_data<T: QueryData>(&self, key: &str, value: T) {
    let queries = lock(&self.inner.queries);
    let Some(registration) = queries.get(key) else {
      self.inner.store.set(key, &value);
      return;
    };

    registration.generation.advance_with(|| {
      self.inner.store.set(key, &value);
      match registration.publisher.downcast_ref::<Publisher<T>>() {
        Some(publisher) => {
          publisher.send_replace(QueryState::fresh(value));
        }
        None => warn!(key, "Cache written with a type its subscribers do not read"),
      }
    });
  }

  /// Drop the cached value as if it had never been fetched.
  ///
  /// Subscribers see a pending state and a new fetch starts.
  pub fn clear_query_data(&self, key: &str) {
    let queries = lock(&self.inner.queries);
    match queries.get(key) {
      Some(registration) => {
        registration.generation.advance_with(|| self.inner.store.remove(key));
        let _ = registration.triggers.send(Trigger::Invalidate);
      }
      None => {
        self.inner.store.remove(key);
      }
    }
  }

  /// Remove `key` from the cache without notifying anyone.
  pub fn remove_query(&self, key: &str) -> bool {
    let removed = self.inner.store.remove(key);
    if removed {
      debug!(key, "Removed cache entry");
    }
    removed
  }

  /// One-shot read-through: fresh cache wins, otherwise fetch (with the
  /// config's retries). A failed fetch falls back to stale cached data.
  pub async fn fetch_query<T, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    config: &QueryConfig,
  ) -> Result<CacheResult<T>, FetchError>
  where
    T: QueryData,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let cached = match self.inner.store.get::<T>(key) {
      Some(entry) if !entry.is_stale(config.stale_time) => {
        debug!(key, "Serving fresh cached data");
        return Ok(CacheResult::from_cache(entry.value, entry.fetched_at));
      }
      cached => cached,
    };

    match fetch::run(fetcher, config.retry_policy()).await {
      Ok(data) => {
        self.set_query_data(key, data.clone());
        Ok(CacheResult::from_network(data))
      }
      Err(error) => match cached {
        Some(entry) => {
          warn!(key, %error, "Network unavailable, serving stale cached data");
          Ok(CacheResult::offline(entry.value, entry.fetched_at))
        }
        None => Err(error),
      },
    }
  }

  /// Keys with at least one subscriber, sorted.
  pub fn active_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = lock(&self.inner.queries).keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn subscriber_count(&self, key: &str) -> usize {
    lock(&self.inner.queries)
      .get(key)
      .map(|registration| registration.subscribers)
      .unwrap_or(0)
  }

  pub fn window_focused(&self) {
    self.inner.signals.focus_gained();
  }

  pub fn reconnected(&self) {
    self.inner.signals.reconnected();
  }

  /// Exclusive access to `key` for one mutation, if mutations are serialized.
  pub(crate) async fn mutation_guard(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
    if !self.inner.options.serialize_mutations {
      return None;
    }
    let key_lock = lock(&self.inner.mutation_locks)
      .entry(key.to_string())
      .or_default()
      .clone();
    Some(key_lock.lock_owned().await)
  }

  fn cancel_eviction(&self, key: &str) {
    if lock(&self.inner.evictions).remove(key).is_some() {
      debug!(key, "Eviction cancelled, key observed again");
    }
  }

  fn schedule_eviction(&self, key: &str, after: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      return;
    };
    let lease = self.inner.next_lease.fetch_add(1, Ordering::SeqCst);
    lock(&self.inner.evictions).insert(key.to_string(), lease);

    let client: Weak<ClientInner> = Arc::downgrade(&self.inner);
    let key = key.to_string();
    runtime.spawn(async move {
      tokio::time::sleep(after).await;
      if let Some(inner) = client.upgrade() {
        QueryClient { inner }.evict_if_unobserved(&key, lease);
      }
    });
  }

  fn evict_if_unobserved(&self, key: &str, lease: u64) {
    {
      let mut evictions = lock(&self.inner.evictions);
      if evictions.get(key) != Some(&lease) {
        return;
      }
      evictions.remove(key);
    }

    if lock(&self.inner.queries).contains_key(key) {
      return;
    }
    if self.inner.store.remove(key) {
      debug!(key, "Evicted unobserved cache entry");
    }
  }
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("cached", &self.inner.store.keys())
      .field("active", &self.active_keys())
      .field("options", &self.inner.options)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::AtomicUsize;
  use tokio::time::{advance, sleep};

  #[derive(Clone, Default)]
  struct Counter(Arc<AtomicUsize>);

  impl Counter {
    fn hit(&self) -> usize {
      self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get(&self) -> usize {
      self.0.load(Ordering::SeqCst)
    }
  }

  fn client() -> QueryClient {
    QueryClient::new(LifecycleSignals::new())
  }

  fn quiet_config() -> QueryConfig {
    QueryConfig::default()
      .with_stale_time(Duration::from_secs(10))
      .with_refetch_on_window_focus(false)
      .with_refetch_on_reconnect(false)
      .with_retry(0, Duration::ZERO)
  }

  fn counting(calls: &Counter) -> impl Fn() -> futures::future::Ready<Result<usize>> + Send + Sync + 'static {
    let calls = calls.clone();
    move || futures::future::ready(Ok(calls.hit()))
  }

  #[tokio::test(start_paused = true)]
  async fn test_first_read_is_pending_until_fetch_resolves() {
    let client = client();
    let mut handle = client
      .use_query(
        "numbers",
        || async {
          sleep(Duration::from_millis(50)).await;
          Ok(vec![1, 2, 3])
        },
        quiet_config(),
      )
      .unwrap();

    assert_eq!(handle.state(), QueryState::pending());

    let state = handle.wait_for(|s| !s.is_loading).await;
    assert_eq!(state, QueryState::fresh(vec![1, 2, 3]));
    assert_eq!(client.get_query_data::<Vec<i32>>("numbers"), Some(vec![1, 2, 3]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_cache_is_served_and_revalidated() {
    let client = client();
    client.set_query_data("count", 100usize);
    advance(Duration::from_secs(9)).await;

    let calls = Counter::default();
    let mut handle = client.use_query("count", counting(&calls), quiet_config()).unwrap();

    assert_eq!(handle.state(), QueryState::fresh(100));

    let state = handle.wait_for(|s| s.data != Some(100)).await;
    assert_eq!(state, QueryState::fresh(1));
    assert_eq!(calls.get(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_cache_is_served_while_loading() {
    let client = client();
    client.set_query_data("count", 100usize);
    advance(Duration::from_secs(11)).await;

    let calls = Counter::default();
    let mut handle = client.use_query("count", counting(&calls), quiet_config()).unwrap();

    let state = handle.state();
    assert_eq!(state.data, Some(100));
    assert!(state.is_loading);
    assert!(state.is_stale);

    let state = handle.wait_for(|s| !s.is_loading).await;
    assert_eq!(state, QueryState::fresh(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_refresh_keeps_cached_data() {
    let client = client();
    client.set_query_data("count", 7usize);
    advance(Duration::from_secs(30)).await;

    let mut handle = client
      .use_query(
        "count",
        || async { Err::<usize, _>(eyre!("connection refused")) },
        quiet_config(),
      )
      .unwrap();

    let state = handle.wait_for(|s| !s.is_loading).await;
    assert_eq!(state.data, Some(7));
    assert!(state.is_stale);
    let error = state.error.unwrap();
    assert_eq!(error.attempts, 1);
    assert!(error.message.contains("connection refused"));
    assert_eq!(client.get_query_data::<usize>("count"), Some(7));
  }

  #[tokio::test(start_paused = true)]
  async fn test_superseded_fetch_is_discarded() {
    let client = client();
    let calls = Counter::default();
    let fetch_calls = calls.clone();

    let handle = client
      .use_query(
        "count",
        move || {
          let n = fetch_calls.hit();
          async move {
            // The first fetch is slow and must lose to the second
            if n == 1 {
              sleep(Duration::from_millis(100)).await;
            }
            Ok(n)
          }
        },
        quiet_config(),
      )
      .unwrap();

    sleep(Duration::from_millis(10)).await;
    handle.refetch();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.get(), 2);
    assert_eq!(handle.data(), Some(2));
    assert_eq!(client.get_query_data::<usize>("count"), Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_direct_write_survives_in_flight_fetch() {
    let client = client();
    let handle = client
      .use_query(
        "label",
        || async {
          sleep(Duration::from_millis(100)).await;
          Ok("server".to_string())
        },
        quiet_config(),
      )
      .unwrap();

    sleep(Duration::from_millis(10)).await;
    client.set_query_data("label", "optimistic".to_string());
    sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.data().as_deref(), Some("optimistic"));
    assert_eq!(client.get_query_data::<String>("label").as_deref(), Some("optimistic"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_interval_polls_while_subscribed() {
    let client = client();
    let calls = Counter::default();
    let config = quiet_config().with_refetch_interval(Some(Duration::from_secs(15)));
    let _handle = client.use_query("count", counting(&calls), config).unwrap();

    sleep(Duration::from_secs(46)).await;
    // mount + ticks at 15s, 30s, 45s
    assert_eq!(calls.get(), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_focus_burst_collapses_into_one_refresh() {
    let client = client();
    let calls = Counter::default();
    let config = quiet_config().with_refetch_on_window_focus(true);
    let _handle = client.use_query("count", counting(&calls), config).unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.get(), 1);

    client.window_focused();
    client.window_focused();
    client.window_focused();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.get(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_focus_ignored_when_disabled() {
    let client = client();
    let calls = Counter::default();
    let _handle = client.use_query("count", counting(&calls), quiet_config()).unwrap();
    sleep(Duration::from_millis(1)).await;

    client.window_focused();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.get(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_refreshes_opted_in_keys_only() {
    let client = client();
    let eager = Counter::default();
    let lazy = Counter::default();
    let _a = client
      .use_query("eager", counting(&eager), quiet_config().with_refetch_on_reconnect(true))
      .unwrap();
    let _b = client.use_query("lazy", counting(&lazy), quiet_config()).unwrap();
    sleep(Duration::from_millis(1)).await;

    client.reconnected();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(eager.get(), 2);
    assert_eq!(lazy.get(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_subscribers_share_one_driver() {
    let client = client();
    let calls = Counter::default();
    let mut first = client.use_query("count", counting(&calls), quiet_config()).unwrap();
    first.wait_for(|s| !s.is_loading).await;

    let mut second = client.use_query("count", counting(&calls), quiet_config()).unwrap();
    assert_eq!(client.subscriber_count("count"), 2);
    assert_eq!(client.active_keys(), vec!["count".to_string()]);

    // Joining revalidates once through the shared driver
    second.wait_for(|s| s.data == Some(2)).await;

    client.invalidate("count");
    let a = first.wait_for(|s| s.data == Some(3)).await;
    let b = second.wait_for(|s| s.data == Some(3)).await;
    assert_eq!(a, b);
    assert_eq!(calls.get(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_last_unsubscribe_stops_polling() {
    let client = client();
    let calls = Counter::default();
    let config = quiet_config().with_refetch_interval(Some(Duration::from_secs(15)));
    let handle = client.use_query("count", counting(&calls), config).unwrap();
    sleep(Duration::from_millis(1)).await;

    drop(handle);
    assert!(client.active_keys().is_empty());
    sleep(Duration::from_secs(60)).await;

    assert_eq!(calls.get(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unobserved_entry_evicted_after_cache_time() {
    let client = client();
    let calls = Counter::default();
    let config = quiet_config().with_cache_time(Some(Duration::from_secs(30)));
    let mut handle = client.use_query("count", counting(&calls), config).unwrap();
    handle.wait_for(|s| !s.is_loading).await;

    drop(handle);
    sleep(Duration::from_secs(29)).await;
    assert!(client.store().contains("count"));

    sleep(Duration::from_secs(2)).await;
    assert!(!client.store().contains("count"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_resubscribe_cancels_eviction() {
    let client = client();
    let calls = Counter::default();
    let config = quiet_config().with_cache_time(Some(Duration::from_secs(30)));
    let mut handle = client.use_query("count", counting(&calls), config.clone()).unwrap();
    handle.wait_for(|s| !s.is_loading).await;
    drop(handle);

    sleep(Duration::from_secs(10)).await;
    let _again = client.use_query("count", counting(&calls), config).unwrap();
    sleep(Duration::from_secs(40)).await;

    assert!(client.store().contains("count"));
  }

  #[tokio::test]
  async fn test_type_mismatch_on_active_key() {
    let client = client();
    let _numbers = client
      .use_query("shared", || async { Ok(vec![1u32]) }, quiet_config())
      .unwrap();

    let result = client.use_query("shared", || async { Ok("text".to_string()) }, quiet_config());
    assert_eq!(
      result.err(),
      Some(QueryError::TypeMismatch {
        key: "shared".to_string()
      })
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_clear_query_data_refetches() {
    let client = client();
    let calls = Counter::default();
    let mut handle = client.use_query("count", counting(&calls), quiet_config()).unwrap();
    handle.wait_for(|s| !s.is_loading).await;

    client.clear_query_data("count");
    let state = handle.wait_for(|s| s.data == Some(2)).await;
    assert!(state.is_success());
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_query_sources() {
    let client = client();
    let config = quiet_config();

    let first = client
      .fetch_query("count", || async { Ok(1usize) }, &config)
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let cached = client
      .fetch_query("count", || async { Ok(2usize) }, &config)
      .await
      .unwrap();
    assert_eq!(cached.source, CacheSource::CacheFresh);
    assert_eq!(cached.data, 1);

    advance(Duration::from_secs(11)).await;
    let offline = client
      .fetch_query("count", || async { Err::<usize, _>(eyre!("offline")) }, &config)
      .await
      .unwrap();
    assert_eq!(offline.source, CacheSource::Offline);
    assert_eq!(offline.data, 1);

    let missing = client
      .fetch_query("other", || async { Err::<usize, _>(eyre!("offline")) }, &config)
      .await;
    assert!(missing.is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_without_subscribers_is_noop() {
    let client = client();
    client.set_query_data("count", 7usize);

    client.invalidate("count");
    client.invalidate("unknown");

    assert_eq!(client.get_query_data::<usize>("count"), Some(7));
    assert!(client.active_keys().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_all_refreshes_every_active_key() {
    let client = client();
    let first = Counter::default();
    let second = Counter::default();
    let mut a = client.use_query("a", counting(&first), quiet_config()).unwrap();
    let mut b = client.use_query("b", counting(&second), quiet_config()).unwrap();
    a.wait_for(|s| !s.is_loading).await;
    b.wait_for(|s| !s.is_loading).await;

    client.invalidate_all();
    a.wait_for(|s| s.data == Some(2)).await;
    b.wait_for(|s| s.data == Some(2)).await;
    assert_eq!((first.get(), second.get()), (2, 2));

    assert!(client.remove_query("a"));
    assert_eq!(client.get_query_data::<usize>("a"), None);
  }
}

//! Per-key refresh loop.

use color_eyre::Result;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::config::QueryConfig;
use super::state::QueryState;
use crate::cache::{CacheStore, QueryData};
use crate::error::FetchError;
use crate::fetch;

/// Boxed producer of a resource's current server value.
pub(crate) type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Channel a query publishes its state on.
pub(crate) type Publisher<T> = Arc<watch::Sender<QueryState<T>>>;

/// Focus events closer together than this collapse into one refresh.
pub(crate) const FOCUS_DEBOUNCE: Duration = Duration::from_millis(100);

/// Why a refresh started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
  Mount,
  Invalidate,
  Interval,
  WindowFocus,
  Reconnect,
}

type InFlight<T> = BoxFuture<'static, (u64, Result<T, FetchError>)>;

/// Monotonic write counter of one key.
///
/// Every refresh start and every direct cache write advances it. A fetch
/// may only land if the counter still holds the value it started with;
/// check and write happen under the same lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Generation(Arc<Mutex<u64>>);

impl Generation {
  fn lock(&self) -> MutexGuard<'_, u64> {
    self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Advance the counter and run `write` before anyone can observe the new value.
  pub(crate) fn advance_with<R>(&self, write: impl FnOnce() -> R) -> R {
    let mut current = self.lock();
    *current += 1;
    write()
  }

  pub(crate) fn advance(&self) -> u64 {
    let mut current = self.lock();
    *current += 1;
    *current
  }

  /// Run `write` only if `generation` is still the latest. Returns whether it ran.
  pub(crate) fn if_current(&self, generation: u64, write: impl FnOnce()) -> bool {
    let current = self.lock();
    if *current != generation {
      return false;
    }
    write();
    true
  }
}

/// State a consumer should see right now for `key`, given no fetch result yet.
pub(crate) fn derive_state<T: QueryData>(
  store: &CacheStore,
  key: &str,
  stale_time: Duration,
) -> QueryState<T> {
  match store.get::<T>(key) {
    Some(entry) if !entry.is_stale(stale_time) => QueryState::fresh(entry.value),
    cached => QueryState::loading(cached.map(|entry| entry.value)),
  }
}

/// Owns the lifecycle of one active key: merges every trigger source into
/// a single loop so at most one fetch is in flight at any time.
pub(crate) struct QueryDriver<T: QueryData> {
  pub(crate) key: String,
  pub(crate) config: QueryConfig,
  pub(crate) fetcher: Fetcher<T>,
  pub(crate) store: Arc<CacheStore>,
  pub(crate) publisher: Publisher<T>,
  pub(crate) generation: Generation,
  pub(crate) triggers: mpsc::UnboundedReceiver<Trigger>,
  pub(crate) focus: broadcast::Receiver<()>,
  pub(crate) reconnect: broadcast::Receiver<()>,
}

impl<T: QueryData> QueryDriver<T> {
  pub(crate) async fn run(mut self) {
    let mut interval = self.config.refetch_interval.filter(|p| !p.is_zero()).map(|period| {
      let mut interval = time::interval_at(Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      interval
    });
    let mut focus_open = self.config.refetch_on_window_focus;
    let mut reconnect_open = self.config.refetch_on_reconnect;
    let mut focus_deadline: Option<Instant> = None;
    let mut in_flight: Option<InFlight<T>> = Some(self.begin_refresh(Trigger::Mount));

    loop {
      tokio::select! {
        (generation, outcome) = settle(&mut in_flight) => {
          in_flight = None;
          self.finish_refresh(generation, outcome);
        }
        trigger = self.triggers.recv() => match trigger {
          // Replacing the future drops (cancels) the previous fetch
          Some(trigger) => in_flight = Some(self.begin_refresh(trigger)),
          None => break,
        },
        _ = next_tick(&mut interval) => {
          in_flight = Some(self.begin_refresh(Trigger::Interval));
        }
        event = self.focus.recv(), if focus_open => match event {
          Ok(()) | Err(RecvError::Lagged(_)) => {
            focus_deadline = Some(Instant::now() + FOCUS_DEBOUNCE);
          }
          Err(RecvError::Closed) => focus_open = false,
        },
        _ = debounce_elapsed(focus_deadline) => {
          focus_deadline = None;
          in_flight = Some(self.begin_refresh(Trigger::WindowFocus));
        }
        event = self.reconnect.recv(), if reconnect_open => match event {
          Ok(()) | Err(RecvError::Lagged(_)) => {
            in_flight = Some(self.begin_refresh(Trigger::Reconnect));
          }
          Err(RecvError::Closed) => reconnect_open = false,
        },
      }
    }

    debug!(key = %self.key, "Query driver stopped");
  }

  fn begin_refresh(&self, trigger: Trigger) -> InFlight<T> {
    let generation = self.generation.advance();
    let state = derive_state::<T>(&self.store, &self.key, self.config.stale_time);
    debug!(
      key = %self.key,
      ?trigger,
      generation,
      stale = state.is_stale,
      "Refresh started"
    );
    self.publisher.send_replace(state);

    let fetcher = Arc::clone(&self.fetcher);
    let policy = self.config.retry_policy();
    Box::pin(async move { (generation, fetch::run(|| fetcher(), policy).await) })
  }

  fn finish_refresh(&self, generation: u64, outcome: Result<T, FetchError>) {
    let landed = match outcome {
      Ok(data) => self.generation.if_current(generation, || {
        self.store.set(&self.key, &data);
        self.publisher.send_replace(QueryState::fresh(data));
      }),
      Err(error) => self.generation.if_current(generation, || {
        warn!(key = %self.key, %error, "Refresh failed, serving cached data");
        let cached = self.store.get::<T>(&self.key).map(|entry| entry.value);
        self.publisher.send_replace(QueryState::failed(cached, error));
      }),
    };

    if !landed {
      debug!(key = %self.key, generation, "Discarding superseded fetch result");
    }
  }
}

async fn settle<T>(in_flight: &mut Option<InFlight<T>>) -> (u64, Result<T, FetchError>) {
  match in_flight {
    Some(fetch) => fetch.await,
    None => std::future::pending().await,
  }
}

async fn next_tick(interval: &mut Option<Interval>) {
  match interval {
    Some(interval) => {
      interval.tick().await;
    }
    None => std::future::pending::<()>().await,
  }
}

async fn debounce_elapsed(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => time::sleep_until(deadline).await,
    None => std::future::pending::<()>().await,
  }
}

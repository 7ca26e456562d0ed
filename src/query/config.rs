use std::time::Duration;

use crate::fetch::RetryPolicy;

/// Freshness, polling and retry parameters of one resource.
///
/// Constant for the lifetime of a query: the first subscriber's config is
/// the one its driver runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
  /// Age at which cached data counts as stale
  pub stale_time: Duration,
  /// How long an unobserved entry stays cached; `None` keeps it until evicted
  pub cache_time: Option<Duration>,
  /// Background polling period; `None` disables polling
  pub refetch_interval: Option<Duration>,
  pub refetch_on_window_focus: bool,
  pub refetch_on_reconnect: bool,
  /// Additional attempts after a failed fetch
  pub retry_count: u32,
  /// Base backoff delay, doubled per retry
  pub retry_delay: Duration,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(5 * 60),
      cache_time: Some(Duration::from_secs(10 * 60)),
      refetch_interval: None,
      refetch_on_window_focus: true,
      refetch_on_reconnect: true,
      retry_count: 2,
      retry_delay: Duration::from_millis(1000),
    }
  }
}

impl QueryConfig {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_cache_time(mut self, cache_time: Option<Duration>) -> Self {
    self.cache_time = cache_time;
    self
  }

  pub fn with_refetch_interval(mut self, interval: Option<Duration>) -> Self {
    self.refetch_interval = interval;
    self
  }

  pub fn with_refetch_on_window_focus(mut self, enabled: bool) -> Self {
    self.refetch_on_window_focus = enabled;
    self
  }

  pub fn with_refetch_on_reconnect(mut self, enabled: bool) -> Self {
    self.refetch_on_reconnect = enabled;
    self
  }

  pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
    self.retry_count = retry_count;
    self.retry_delay = retry_delay;
    self
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.retry_count, self.retry_delay)
  }
}

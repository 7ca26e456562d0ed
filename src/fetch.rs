//! Retrying executor for async producers.

use color_eyre::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;

/// How often and how patiently a producer is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Additional attempts after the first failure
  pub retry_count: u32,
  /// Delay before the first retry; doubles for every further retry
  pub base_delay: Duration,
}

impl RetryPolicy {
  pub fn new(retry_count: u32, base_delay: Duration) -> Self {
    Self {
      retry_count,
      base_delay,
    }
  }

  /// Single attempt, no retries.
  pub fn none() -> Self {
    Self::new(0, Duration::ZERO)
  }

  /// Delay to wait after the `attempt`-th consecutive failure (1-based):
  /// `base_delay * 2^(attempt-1)`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor)
  }
}

/// Run `producer` until it succeeds or the retry budget is spent.
///
/// Each attempt is independent: a failed attempt's partial work is dropped
/// with its future. The last error is surfaced with the total attempt count.
pub async fn run<T, F, Fut>(mut producer: F, policy: RetryPolicy) -> Result<T, FetchError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut attempt = 0u32;

  loop {
    match producer().await {
      Ok(value) => return Ok(value),
      Err(e) => {
        attempt += 1;
        if attempt > policy.retry_count {
          warn!(attempts = attempt, error = %e, "Fetch failed, retries exhausted");
          return Err(FetchError::new(attempt, e.to_string()));
        }

        let delay = policy.delay_for(attempt);
        debug!(attempt, ?delay, error = %e, "Fetch attempt failed, retrying");
        tokio::time::sleep(delay).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::sync::{Arc, Mutex};
  use tokio::time::Instant;

  #[test]
  fn test_backoff_doubles() {
    let policy = RetryPolicy::new(3, Duration::from_millis(1000));
    assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
  }

  #[tokio::test]
  async fn test_success_on_first_attempt() {
    let result = run(|| async { Ok::<_, color_eyre::Report>(7) }, RetryPolicy::none()).await;
    assert_eq!(result, Ok(7));
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_then_succeeds() {
    let calls = Arc::new(Mutex::new(0u32));
    let counter = calls.clone();

    let result = run(
      move || {
        let counter = counter.clone();
        async move {
          let mut n = counter.lock().unwrap();
          *n += 1;
          if *n < 3 {
            Err(eyre!("attempt {} failed", *n))
          } else {
            Ok(*n)
          }
        }
      },
      RetryPolicy::new(2, Duration::from_millis(100)),
    )
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(*calls.lock().unwrap(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhausted_surfaces_last_error() {
    let result: Result<(), FetchError> = run(
      || async { Err(eyre!("server returned 503")) },
      RetryPolicy::new(2, Duration::from_millis(10)),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts, 3);
    assert!(err.message.contains("503"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_attempts_respect_backoff_spacing() {
    let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let recorder = starts.clone();
    let base = Duration::from_millis(250);

    let _ = run(
      move || {
        let recorder = recorder.clone();
        async move {
          recorder.lock().unwrap().push(Instant::now());
          Err::<(), _>(eyre!("down"))
        }
      },
      RetryPolicy::new(3, base),
    )
    .await;

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 4);
    for n in 1..starts.len() {
      let gap = starts[n] - starts[n - 1];
      assert!(gap >= base * 2u32.pow(n as u32 - 1), "gap {} too short: {:?}", n, gap);
    }
  }
}

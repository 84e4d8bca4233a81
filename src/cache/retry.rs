//! Retry with exponential backoff and jitter.

use color_eyre::{Report, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = fn(&Report) -> bool;

/// How a producer is retried.
///
/// Each call to [`retry`] runs independently: there is no budget shared
/// between calls and no circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Total attempts including the first one
  pub max_attempts: u32,
  /// Delay before the first retry, doubled for each further retry
  pub base_delay: Duration,
  /// Upper bound of the random delay added to every backoff
  pub max_jitter: Duration,
  /// Errors for which this returns false are returned without further attempts
  pub retry_if: RetryPredicate,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(1_000),
      max_jitter: Duration::from_millis(1_000),
      retry_if: retry_all,
    }
  }
}

/// Retry every failure regardless of its kind.
pub fn retry_all(_: &Report) -> bool {
  true
}

impl RetryPolicy {
  pub fn with_retry_if(mut self, retry_if: RetryPredicate) -> Self {
    self.retry_if = retry_if;
    self
  }

  /// Deterministic part of the wait after the failed attempt `attempt_index` (0-based).
  pub fn backoff(&self, attempt_index: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor)
  }

  /// Full wait after the failed attempt `attempt_index`, including jitter.
  pub fn delay(&self, attempt_index: u32) -> Duration {
    let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms == 0 {
      Duration::ZERO
    } else {
      Duration::from_millis(fastrand::u64(0..=jitter_ms))
    };
    self.backoff(attempt_index).saturating_add(jitter)
  }
}

/// Run `producer` until it succeeds or the policy gives up.
///
/// Sleeps between attempts, never after the last one. On exhaustion the
/// error of the last attempt is returned unchanged.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut producer: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 0;

  loop {
    match producer().await {
      Ok(value) => {
        if attempt > 0 {
          debug!(attempts = attempt + 1, "producer succeeded after retrying");
        }
        return Ok(value);
      }
      Err(err) => {
        let last = attempt + 1 >= max_attempts;
        if last || !(policy.retry_if)(&err) {
          return Err(err);
        }

        let delay = policy.delay(attempt);
        warn!(
          attempt = attempt + 1,
          max_attempts,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
    }
  }
}

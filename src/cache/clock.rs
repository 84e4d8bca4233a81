//! Time sources for cache timestamps.

use chrono::Utc;

#[cfg(test)]
pub use manual::ManualClock;

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
  fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

//! Freshness classification of cached entries.

use super::storage::StoredEntry;

/// Fraction of the TTL after which an entry counts as stale.
pub const DEFAULT_STALE_RATIO: f64 = 0.8;

/// Age-based classification of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Usable, no refresh needed
  Fresh,
  /// Usable, but a background refresh should be started
  Stale,
  /// Past its TTL, treated as a miss
  Expired,
}

impl Freshness {
  /// Classify an entry at instant `now` (epoch millis).
  ///
  /// - `age > ttl` is expired
  /// - `ttl * stale_ratio < age <= ttl` is stale
  /// - anything younger is fresh (including negative ages from clock skew)
  pub fn classify(entry: &StoredEntry, now: i64, stale_ratio: f64) -> Self {
    let age = now.saturating_sub(entry.timestamp);
    let ttl = i64::try_from(entry.ttl_ms).unwrap_or(i64::MAX);

    if age > ttl {
      Freshness::Expired
    } else if age as f64 > ttl as f64 * stale_ratio {
      Freshness::Stale
    } else {
      Freshness::Fresh
    }
  }

  pub fn is_expired(self) -> bool {
    self == Freshness::Expired
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn entry_at(timestamp: i64, ttl_ms: u64) -> StoredEntry {
    StoredEntry {
      data: json!({"login": "octocat"}),
      timestamp,
      ttl_ms,
      etag: None,
    }
  }

  #[test]
  fn fresh_right_after_insert() {
    let entry = entry_at(10_000, 1_000);
    assert_eq!(
      Freshness::classify(&entry, 10_000, DEFAULT_STALE_RATIO),
      Freshness::Fresh
    );
  }

  #[test]
  fn boundaries_follow_ratio_and_ttl() {
    let entry = entry_at(0, 1_000);

    assert_eq!(Freshness::classify(&entry, 800, 0.8), Freshness::Fresh);
    assert_eq!(Freshness::classify(&entry, 801, 0.8), Freshness::Stale);
    assert_eq!(Freshness::classify(&entry, 1_000, 0.8), Freshness::Stale);
    assert_eq!(Freshness::classify(&entry, 1_001, 0.8), Freshness::Expired);
  }

  #[test]
  fn profile_scenario() {
    let entry = entry_at(0, 3_600_000);

    assert_eq!(
      Freshness::classify(&entry, 2_900_001, DEFAULT_STALE_RATIO),
      Freshness::Stale
    );
    assert!(Freshness::classify(&entry, 3_600_001, DEFAULT_STALE_RATIO).is_expired());
  }

  #[test]
  fn clock_skew_counts_as_fresh() {
    let entry = entry_at(5_000, 1_000);
    assert_eq!(Freshness::classify(&entry, 4_000, 0.8), Freshness::Fresh);
  }

  #[test]
  fn ratio_of_one_disables_stale_window() {
    let entry = entry_at(0, 1_000);
    assert_eq!(Freshness::classify(&entry, 1_000, 1.0), Freshness::Fresh);
    assert_eq!(Freshness::classify(&entry, 1_001, 1.0), Freshness::Expired);
  }

  #[test]
  fn ttl_beyond_i64_is_not_negative() {
    let entry = entry_at(0, u64::MAX);
    assert_eq!(Freshness::classify(&entry, 1_000_000, 0.8), Freshness::Fresh);
  }
}

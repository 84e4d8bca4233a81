//! Core traits and types for the caching system.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{Report, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;

/// Trait for payloads that can be cached.
///
/// Payloads are stored serialized, so every read hands out an independent copy.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at_millis: i64, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: millis_to_datetime(cached_at_millis),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at_millis: i64) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: millis_to_datetime(cached_at_millis),
    }
  }
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(millis).single()
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, considered stale, background refresh started
  CacheStale,
  /// Offline mode - fetch failed, serving the last known data
  Offline,
}

/// Cloneable error shared by every waiter of one fetch.
#[derive(Clone)]
pub struct FetchError(Arc<Report>);

impl FetchError {
  pub fn new(report: Report) -> Self {
    Self(Arc::new(report))
  }
}

impl From<Report> for FetchError {
  fn from(report: Report) -> Self {
    Self::new(report)
  }
}

impl fmt::Debug for FetchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&*self.0, f)
  }
}

impl fmt::Display for FetchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Alternate form prints the whole cause chain
    write!(f, "{:#}", self.0)
  }
}

impl std::error::Error for FetchError {}

/// What the caller is being handed, for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSignal {
  FreshResult,
  StaleResultBackgroundRefreshing,
  CachedResultDueToFetchFailure,
  HardFailureNoCache,
}

impl fmt::Display for FetchSignal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      FetchSignal::FreshResult => "fresh",
      FetchSignal::StaleResultBackgroundRefreshing => "stale, refreshing",
      FetchSignal::CachedResultDueToFetchFailure => "cached, fetch failed",
      FetchSignal::HardFailureNoCache => "failed",
    };
    f.write_str(label)
  }
}

/// Uniform result of every orchestrated fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
  /// Fresh cache hit or a successful network fetch
  Fresh(CacheResult<T>),
  /// Stale cache hit; a background refresh has been started
  StaleServing(CacheResult<T>),
  /// The fetch failed after retries, last known data served instead
  Degraded(CacheResult<T>, FetchError),
  /// The fetch failed and nothing was cached
  Failed(FetchError),
}

impl<T> FetchOutcome<T> {
  pub fn signal(&self) -> FetchSignal {
    match self {
      FetchOutcome::Fresh(_) => FetchSignal::FreshResult,
      FetchOutcome::StaleServing(_) => FetchSignal::StaleResultBackgroundRefreshing,
      FetchOutcome::Degraded(..) => FetchSignal::CachedResultDueToFetchFailure,
      FetchOutcome::Failed(_) => FetchSignal::HardFailureNoCache,
    }
  }

  /// The served data, if any.
  #[cfg(test)]
  pub fn data(&self) -> Option<&T> {
    self.result().map(|r| &r.data)
  }

  pub fn result(&self) -> Option<&CacheResult<T>> {
    match self {
      FetchOutcome::Fresh(r) | FetchOutcome::StaleServing(r) | FetchOutcome::Degraded(r, _) => {
        Some(r)
      }
      FetchOutcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&FetchError> {
    match self {
      FetchOutcome::Degraded(_, e) | FetchOutcome::Failed(e) => Some(e),
      _ => None,
    }
  }

  /// Collapse into a plain result; only a hard failure becomes an error.
  #[cfg(test)]
  pub fn into_result(self) -> Result<CacheResult<T>> {
    match self {
      FetchOutcome::Fresh(r) | FetchOutcome::StaleServing(r) | FetchOutcome::Degraded(r, _) => {
        Ok(r)
      }
      FetchOutcome::Failed(e) => Err(Report::new(e)),
    }
  }
}

//! Cache storage trait and in-memory implementation.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use super::clock::Clock;
use super::freshness::Freshness;

/// A single cached payload with its age metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
  /// Serialized payload
  pub data: Value,
  /// When the entry was written (epoch millis)
  pub timestamp: i64,
  /// Validity window in milliseconds
  pub ttl_ms: u64,
  /// Validator for conditional requests, not used for freshness
  pub etag: Option<String>,
}

/// Trait for cache storage backends.
///
/// Every mutation is atomic per key; there is no partial update of an entry.
pub trait CacheStorage: Send + Sync {
  /// Look up a live entry. Expired entries are removed and reported as a miss.
  fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

  /// Insert or overwrite an entry, stamped with the current time.
  fn set(&self, key: &str, data: Value, ttl_ms: u64, etag: Option<String>) -> Result<()>;

  /// Remove an entry. Returns whether something was removed.
  fn delete(&self, key: &str) -> Result<bool>;

  /// Remove every entry whose key starts with `prefix`. Returns the count removed.
  fn delete_prefix(&self, prefix: &str) -> Result<usize>;

  /// Number of entries currently held, expired or not.
  fn len(&self) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled (demo mode, no credentials) - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _data: Value, _ttl_ms: u64, _etag: Option<String>) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _key: &str) -> Result<bool> {
    Ok(false)
  }

  fn delete_prefix(&self, _prefix: &str) -> Result<usize> {
    Ok(0)
  }

  fn len(&self) -> Result<usize> {
    Ok(0)
  }
}

/// Process-local cache storage with lazy expiry.
///
/// Entries are never swept by a timer; an expired entry lingers until the next
/// `get` for its key discovers and removes it.
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, StoredEntry>>,
  clock: Arc<dyn Clock>,
}

impl MemoryStorage {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredEntry>>> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
    let now = self.clock.now_millis();
    let mut entries = self.lock()?;

    let expired = match entries.get(key) {
      None => return Ok(None),
      // Ratio only matters for stale detection, expiry is independent of it
      Some(entry) => Freshness::classify(entry, now, 1.0).is_expired(),
    };

    if expired {
      trace!(key, "evicting expired entry");
      entries.remove(key);
      return Ok(None);
    }

    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, data: Value, ttl_ms: u64, etag: Option<String>) -> Result<()> {
    let entry = StoredEntry {
      data,
      timestamp: self.clock.now_millis(),
      ttl_ms,
      etag,
    };
    self.lock()?.insert(key.to_string(), entry);
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<bool> {
    Ok(self.lock()?.remove(key).is_some())
  }

  fn delete_prefix(&self, prefix: &str) -> Result<usize> {
    let mut entries = self.lock()?;
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    Ok(before - entries.len())
  }

  fn len(&self) -> Result<usize> {
    Ok(self.lock()?.len())
  }
}

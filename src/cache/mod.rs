//! Generic caching layer for request deduplication and offline support.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores payloads per key with a TTL, expiring them lazily on read
//! - Serves stale entries immediately while refreshing them in the background
//! - Retries failed fetches with exponential backoff and jitter
//! - Provides basic offline mode (serve the last known data when the network fails)

mod clock;
mod freshness;
mod key;
mod layer;
mod retry;
mod storage;
mod traits;

pub use freshness::DEFAULT_STALE_RATIO;
pub use key::{build_key, CacheKey, Dataset, IdentityFingerprint, KeyParams};
pub use layer::CacheLayer;
pub use retry::RetryPolicy;
pub use traits::{CacheSource, Cacheable, FetchOutcome, FetchSignal};

#[cfg(test)]
pub use clock::{Clock, ManualClock};
#[cfg(test)]
pub use storage::MemoryStorage;
#[cfg(test)]
pub use traits::{CacheResult, FetchError};

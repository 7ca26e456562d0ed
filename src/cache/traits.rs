//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Anything that can sit in the cache as the value of a resource key.
///
/// Values are stored serialized, so they round-trip through serde.
pub trait QueryData: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> QueryData for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Trait for entities that live inside a cached collection.
///
/// Used to find the one entity an optimistic edit should touch.
pub trait Cacheable: QueryData {
  /// Identifier of this entity within its collection (e.g., table id)
  fn cache_key(&self) -> i64;

  /// Entity type name for logs and error messages (e.g., "table")
  fn entity_type() -> &'static str;
}

/// A cached value for one resource key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub key: String,
  pub value: T,
  /// When the value was written (fetch completion or optimistic write)
  pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
  /// Time elapsed since the value was written.
  pub fn age(&self) -> Duration {
    Instant::now().saturating_duration_since(self.fetched_at)
  }

  /// Whether the value is older than the given staleness window.
  pub fn is_stale(&self, stale_time: Duration) -> bool {
    self.age() >= stale_time
  }
}

/// Result from a read-through cache operation, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the served value was cached (if from cache)
  pub cached_at: Option<Instant>,
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

  /// Create a new cache result from cached data that is still fresh.
  pub fn from_cache(data: T, cached_at: Instant) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: Instant) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Network unavailable, serving stale cached data
  Offline,
}

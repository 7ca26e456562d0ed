//! In-memory cache store keyed by resource key.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::warn;

use super::traits::{CacheEntry, QueryData};

/// A stored entry, kept serialized so one store can hold every resource type.
#[derive(Debug, Clone)]
struct StoredEntry {
  data: Value,
  fetched_at: Instant,
}

/// Process-wide key → entry mapping.
///
/// No freshness policy lives here: the query engine decides what "stale"
/// means. Operations never fail; a value that cannot be encoded or decoded
/// is logged and treated as absent.
#[derive(Debug, Default)]
pub struct CacheStore {
  entries: Mutex<HashMap<String, StoredEntry>>,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
    // A panic while holding the lock cannot leave a half-written entry:
    // every write replaces the whole value.
    self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Get the cached value for a key, decoded as `T`.
  pub fn get<T: QueryData>(&self, key: &str) -> Option<CacheEntry<T>> {
    let stored = self.lock().get(key).cloned()?;

    match serde_json::from_value::<T>(stored.data) {
      Ok(value) => Some(CacheEntry {
        key: key.to_string(),
        value,
        fetched_at: stored.fetched_at,
      }),
      Err(e) => {
        warn!(key, error = %e, "Cached value does not match the requested type");
        None
      }
    }
  }

  /// Write a value with `fetched_at = now`, replacing any previous entry.
  pub fn set<T: QueryData>(&self, key: &str, value: &T) {
    let data = match serde_json::to_value(value) {
      Ok(data) => data,
      Err(e) => {
        warn!(key, error = %e, "Failed to serialize value for cache");
        return;
      }
    };

    self.lock().insert(
      key.to_string(),
      StoredEntry {
        data,
        fetched_at: Instant::now(),
      },
    );
  }

  /// Delete the entry for a key. Returns whether one existed.
  pub fn remove(&self, key: &str) -> bool {
    self.lock().remove(key).is_some()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.lock().contains_key(key)
  }

  /// All keys currently cached, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lock().keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Raw JSON view of the whole cache, for inspection.
  pub fn snapshot(&self) -> Value {
    let entries = self.lock();
    let map = entries
      .iter()
      .map(|(key, entry)| (key.clone(), entry.data.clone()))
      .collect();
    Value::Object(map)
  }
}

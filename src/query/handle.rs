use tokio::sync::watch;

use super::client::QueryClient;
use super::state::QueryState;
use crate::cache::QueryData;

/// A subscription to one resource key.
///
/// Holding a handle keeps the key's driver alive; dropping the last one
/// stops background refreshes and starts the cache-time countdown.
pub struct QueryHandle<T: QueryData> {
  key: String,
  receiver: watch::Receiver<QueryState<T>>,
  client: QueryClient,
}

impl<T: QueryData> QueryHandle<T> {
  pub(crate) fn new(key: &str, receiver: watch::Receiver<QueryState<T>>, client: QueryClient) -> Self {
    Self {
      key: key.to_string(),
      receiver,
      client,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// Latest published state.
  pub fn state(&self) -> QueryState<T> {
    self.receiver.borrow().clone()
  }

  pub fn data(&self) -> Option<T> {
    self.receiver.borrow().data.clone()
  }

  /// Check for a newly published state without waiting.
  ///
  /// Returns `true` if the state changed since the last look.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.receiver.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next published state.
  pub async fn changed(&mut self) -> QueryState<T> {
    // The sender lives in the registry for as long as this handle does
    let _ = self.receiver.changed().await;
    self.receiver.borrow_and_update().clone()
  }

  /// Wait until the state satisfies `predicate`, e.g. the first fetch settling.
  pub async fn wait_for(&mut self, mut predicate: impl FnMut(&QueryState<T>) -> bool) -> QueryState<T> {
    let settled = self
      .receiver
      .wait_for(|state| predicate(state))
      .await
      .map(|state| state.clone());
    settled.unwrap_or_else(|_| self.state())
  }

  /// Force a refresh of this key, cancelling any fetch in flight.
  pub fn refetch(&self) {
    self.client.invalidate(&self.key);
  }
}

impl<T: QueryData> Drop for QueryHandle<T> {
  fn drop(&mut self) {
    self.client.unsubscribe(&self.key);
  }
}

impl<T: QueryData + std::fmt::Debug> std::fmt::Debug for QueryHandle<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryHandle")
      .field("key", &self.key)
      .field("state", &*self.receiver.borrow())
      .finish_non_exhaustive()
  }
}

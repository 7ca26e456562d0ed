use crate::error::FetchError;

/// The published state of a query.
///
/// Always derivable from the cache entry's age, the resource's staleness
/// window and whether a fetch is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
  pub data: Option<T>,
  /// A fetch is in flight and the cached value (if any) is not fresh
  pub is_loading: bool,
  /// Last fetch failure, cleared by the next refresh
  pub error: Option<FetchError>,
  pub is_stale: bool,
}

impl<T> QueryState<T> {
  /// Nothing cached yet, first fetch pending.
  pub fn pending() -> Self {
    Self::loading(None)
  }

  /// Stale or missing data with a fetch in flight.
  pub fn loading(data: Option<T>) -> Self {
    Self {
      data,
      is_loading: true,
      error: None,
      is_stale: true,
    }
  }

  /// Fresh data, no fetch blocking the consumer.
  pub fn fresh(data: T) -> Self {
    Self {
      data: Some(data),
      is_loading: false,
      error: None,
      is_stale: false,
    }
  }

  /// Fetch failed; whatever was cached is still served.
  pub fn failed(data: Option<T>, error: FetchError) -> Self {
    Self {
      data,
      is_loading: false,
      error: Some(error),
      is_stale: true,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.is_loading
  }

  pub fn is_stale(&self) -> bool {
    self.is_stale
  }

  pub fn is_error(&self) -> bool {
    self.error.is_some()
  }

  /// Data present, fresh, and no error.
  pub fn is_success(&self) -> bool {
    self.data.is_some() && !self.is_stale && self.error.is_none()
  }

  /// Project the data while keeping the status flags, e.g. to filter a
  /// collection for one view.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
    QueryState {
      data: self.data.map(f),
      is_loading: self.is_loading,
      error: self.error,
      is_stale: self.is_stale,
    }
  }
}

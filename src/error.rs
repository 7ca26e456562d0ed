//! Error taxonomy for the sync engine and the lifecycle rules it drives.

use rust_decimal::Decimal;
use thiserror::Error;

/// Boxed error carried across the remote boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A fetch that kept failing after every retry.
///
/// Never raised through the query interface: it travels as the `error`
/// field of the published state while the stale cache keeps being served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed after {attempts} attempt(s): {message}")]
pub struct FetchError {
  pub attempts: u32,
  pub message: String,
}

impl FetchError {
  pub fn new(attempts: u32, message: impl Into<String>) -> Self {
    Self {
      attempts,
      message: message.into(),
    }
  }
}

/// An action requested from a status that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} {entity} while it is {from}")]
pub struct IllegalTransition {
  pub entity: &'static str,
  pub action: &'static str,
  pub from: &'static str,
}

/// Stock rules violated by an inventory change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
  #[error("ingredient {0} does not exist")]
  UnknownIngredient(i64),

  #[error("ingredient {ingredient_id} needs {required} but only {available} is left")]
  InsufficientStock {
    ingredient_id: i64,
    required: Decimal,
    available: Decimal,
  },

  #[error("stock of ingredient {0} cannot be negative")]
  NegativeStock(i64),
}

/// Failure of a state-changing call.
#[derive(Debug, Error)]
pub enum MutationError {
  /// The remote side rejected the call; the optimistic edit was rolled back.
  #[error("remote rejected mutation on `{key}`: {source}")]
  Rejected {
    key: String,
    #[source]
    source: BoxError,
  },

  /// Refused locally before any remote call, e.g. an order without items.
  #[error("invalid mutation on `{key}`: {reason}")]
  Invalid { key: String, reason: &'static str },

  #[error(transparent)]
  IllegalTransition(#[from] IllegalTransition),

  #[error(transparent)]
  Stock(#[from] StockError),

  /// The entity to change is not in the cached collection, so the
  /// transition cannot be validated locally.
  #[error("{entity} {id} is not in the `{key}` cache")]
  NotCached {
    key: String,
    entity: &'static str,
    id: i64,
  },

  /// A multi-step action whose first steps reached the server.
  #[error("{completed} succeeded but a later step failed: {source}")]
  PartiallyApplied {
    completed: String,
    #[source]
    source: Box<MutationError>,
  },
}

impl MutationError {
  pub fn invalid(key: &str, reason: &'static str) -> Self {
    Self::Invalid {
      key: key.to_string(),
      reason,
    }
  }

  pub fn rejected(key: &str, source: impl Into<BoxError>) -> Self {
    Self::Rejected {
      key: key.to_string(),
      source: source.into(),
    }
  }
}

/// Misuse of the query registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  #[error("query `{key}` is already active with a different data type")]
  TypeMismatch { key: String },
}

//! Optimistic mutations with rollback.
//!
//! A mutation edits the cached value of one key before the remote call
//! runs, so every subscriber sees the change immediately. If the remote
//! call fails the exact prior value is restored; if it succeeds the key is
//! invalidated and the server's view replaces the optimistic one.

use color_eyre::Result;
use std::future::Future;
use tracing::{debug, warn};

use crate::cache::{Cacheable, QueryData};
use crate::error::MutationError;
use crate::query::QueryClient;

/// Apply `transform` to the cached value of `key`, then run `remote`.
///
/// `transform` receives the current value (or `None` when nothing is
/// cached) and may refuse the change, in which case nothing is written and
/// `remote` never runs. Overlapping mutations on one key are not ordered
/// unless the client serializes them; without that, the last rollback wins.
///
/// A rollback is a cache write like any other: the restored value is
/// stamped with the current time and published as fresh, so a value that
/// was stale before the mutation stays unrefreshed for another
/// `stale_time`, and a previous fetch error is cleared.
pub async fn mutate<T, R, Tr, F, Fut>(
  client: &QueryClient,
  key: &str,
  transform: Tr,
  remote: F,
) -> Result<R, MutationError>
where
  T: QueryData,
  Tr: FnOnce(Option<T>) -> Result<T, MutationError>,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<R>>,
{
  let _serial = client.mutation_guard(key).await;

  let snapshot = client.get_query_data::<T>(key);
  let optimistic = transform(snapshot.clone())?;
  client.set_query_data(key, optimistic);
  debug!(key, "Optimistic update applied");

  match remote().await {
    Ok(output) => {
      client.invalidate(key);
      Ok(output)
    }
    Err(e) => {
      warn!(key, error = %e, "Mutation rejected, rolling back");
      match snapshot {
        Some(previous) => client.set_query_data(key, previous),
        None => client.clear_query_data(key),
      }
      Err(MutationError::rejected(key, e))
    }
  }
}

/// Replace the entity with id `id` in a cached collection by `edit`'s result.
///
/// Fails with [`MutationError::NotCached`] when the collection or the
/// entity is missing, since the edit could not be validated.
pub fn patch_entity<E: Cacheable>(
  key: &str,
  entities: Option<Vec<E>>,
  id: i64,
  edit: impl FnOnce(&E) -> Result<E, MutationError>,
) -> Result<Vec<E>, MutationError> {
  let not_cached = || MutationError::NotCached {
    key: key.to_string(),
    entity: E::entity_type(),
    id,
  };

  let mut entities = entities.ok_or_else(not_cached)?;
  let slot = entities
    .iter_mut()
    .find(|entity| entity.cache_key() == id)
    .ok_or_else(not_cached)?;
  *slot = edit(slot)?;
  Ok(entities)
}

use color_eyre::Result;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::api::RestaurantApi;
use crate::cache::CacheResult;
use crate::domain::inventory::{adjust_stock, consume_recipe};
use crate::domain::{Ingredient, Recipe};
use crate::error::{FetchError, MutationError, QueryError};
use crate::mutation::mutate;
use crate::query::{QueryClient, QueryConfig, QueryHandle};

pub const INGREDIENTS_KEY: &str = "all-ingredients";

#[derive(Clone)]
pub struct InventoryResource {
  client: QueryClient,
  api: Arc<dyn RestaurantApi>,
  config: QueryConfig,
}

fn not_cached(id: i64) -> MutationError {
  MutationError::NotCached {
    key: INGREDIENTS_KEY.to_string(),
    entity: "ingredient",
    id,
  }
}

impl InventoryResource {
  pub fn new(client: QueryClient, api: Arc<dyn RestaurantApi>, config: QueryConfig) -> Self {
    Self {
      client,
      api,
      config,
    }
  }

  pub fn config(&self) -> &QueryConfig {
    &self.config
  }

  pub fn subscribe(&self) -> Result<QueryHandle<Vec<Ingredient>>, QueryError> {
    let api = self.api.clone();
    self.client.use_query(
      INGREDIENTS_KEY,
      move || {
        let api = api.clone();
        async move { api.ingredients().await }
      },
      self.config.clone(),
    )
  }

  pub async fn fetch(&self) -> Result<CacheResult<Vec<Ingredient>>, FetchError> {
    self
      .client
      .fetch_query(INGREDIENTS_KEY, || self.api.ingredients(), &self.config)
      .await
  }

  pub fn cached(&self) -> Option<Vec<Ingredient>> {
    self.client.get_query_data(INGREDIENTS_KEY)
  }

  pub fn invalidate(&self) {
    self.client.invalidate(INGREDIENTS_KEY);
  }

  /// Set an ingredient's stock after a count or a purchase.
  pub async fn update_stock(&self, id: i64, stock: Decimal) -> Result<(), MutationError> {
    let planned: OnceLock<Ingredient> = OnceLock::new();

    mutate(
      &self.client,
      INGREDIENTS_KEY,
      |cached: Option<Vec<Ingredient>>| {
        let updated = adjust_stock(&cached.ok_or_else(|| not_cached(id))?, id, stock)?;
        if let Some(ingredient) = updated.iter().find(|ingredient| ingredient.id == id) {
          let _ = planned.set(ingredient.clone());
        }
        Ok(updated)
      },
      || async {
        match planned.get() {
          Some(ingredient) => self.api.update_ingredient(ingredient).await,
          None => Ok(()),
        }
      },
    )
    .await?;

    info!(ingredient_id = id, %stock, "Stock updated");
    Ok(())
  }

  /// Take one portion of `recipe` out of stock.
  ///
  /// All lines are checked against the cached stock first; the backend then
  /// gets one update per ingredient. If it stops accepting them half-way,
  /// the cache is rolled back and refetched and the error counts the
  /// updates that already landed.
  pub async fn consume_recipe(&self, recipe: &Recipe) -> Result<(), MutationError> {
    let planned: OnceLock<Vec<Ingredient>> = OnceLock::new();
    let applied = AtomicUsize::new(0);
    let first_line = recipe.lines.first().map(|line| line.ingredient_id).unwrap_or_default();

    let result = mutate(
      &self.client,
      INGREDIENTS_KEY,
      |cached: Option<Vec<Ingredient>>| {
        let cached = cached.ok_or_else(|| not_cached(first_line))?;
        let updated = consume_recipe(&cached, recipe)?;
        let required = recipe.requirements();
        let changed = updated
          .iter()
          .filter(|ingredient| required.contains_key(&ingredient.id))
          .cloned()
          .collect();
        let _ = planned.set(changed);
        Ok(updated)
      },
      || async {
        for ingredient in planned.get().into_iter().flatten() {
          self.api.update_ingredient(ingredient).await?;
          applied.fetch_add(1, Ordering::SeqCst);
        }
        Ok::<_, color_eyre::Report>(())
      },
    )
    .await;

    let applied = applied.load(Ordering::SeqCst);
    match result {
      Ok(()) => {
        info!(recipe = %recipe.name, lines = applied, "Recipe consumed");
        Ok(())
      }
      Err(error @ MutationError::Rejected { .. }) if applied > 0 => {
        let total = planned.get().map(Vec::len).unwrap_or(applied);
        warn!(recipe = %recipe.name, applied, total, "Recipe only partially recorded");
        self.invalidate();
        Err(MutationError::PartiallyApplied {
          completed: format!("{} of {} stock updates", applied, total),
          source: Box::new(error),
        })
      }
      Err(error) => Err(error),
    }
  }
}

use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

use super::{now, order_key};
use crate::api::RestaurantApi;
use crate::cache::CacheResult;
use crate::domain::{OrderLine, Table, TableAction, TableStatus};
use crate::error::{FetchError, MutationError, QueryError};
use crate::mutation::{mutate, patch_entity};
use crate::query::{QueryClient, QueryConfig, QueryHandle};

pub const TABLES_KEY: &str = "all-tables";

/// The dining room floor: every table and the actions on it.
#[derive(Clone)]
pub struct TablesResource {
  client: QueryClient,
  api: Arc<dyn RestaurantApi>,
  config: QueryConfig,
}

impl TablesResource {
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

  /// Live view of all tables, polled while subscribed.
  pub fn subscribe(&self) -> Result<QueryHandle<Vec<Table>>, QueryError> {
    let api = self.api.clone();
    self.client.use_query(
      TABLES_KEY,
      move || {
        let api = api.clone();
        async move { api.tables().await }
      },
      self.config.clone(),
    )
  }

  /// One-shot read-through of all tables.
  pub async fn fetch(&self) -> Result<CacheResult<Vec<Table>>, FetchError> {
    self
      .client
      .fetch_query(TABLES_KEY, || self.api.tables(), &self.config)
      .await
  }

  pub fn cached(&self) -> Option<Vec<Table>> {
    self.client.get_query_data(TABLES_KEY)
  }

  pub fn invalidate(&self) {
    self.client.invalidate(TABLES_KEY);
  }

  /// Run `action` on a table: validated against the cached status, shown
  /// optimistically, rolled back if the backend refuses.
  ///
  /// `items` is only sent when confirming an order, which needs at least one.
  pub async fn perform(&self, id: i64, action: TableAction, items: &[OrderLine]) -> Result<(), MutationError> {
    if action == TableAction::ConfirmOrder && items.is_empty() {
      return Err(MutationError::invalid(TABLES_KEY, "an order needs at least one item"));
    }

    let now = now();
    let api = self.api.clone();
    let lines = items.to_vec();
    let span = info_span!("table_action", table_id = id, %action);

    mutate(
      &self.client,
      TABLES_KEY,
      |tables: Option<Vec<Table>>| {
        patch_entity(TABLES_KEY, tables, id, |table| Ok(table.apply(action, now)?))
      },
      move || async move {
        match action {
          TableAction::ConfirmOrder => api.confirm_order(id, &lines).await,
          _ => api.table_action(id, action).await,
        }
      },
    )
    .instrument(span)
    .await?;

    info!(table_id = id, %action, "Table updated");
    if action.touches_order() {
      self.client.invalidate(&order_key(id));
    }
    Ok(())
  }

  pub async fn occupy(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::Occupy, &[]).await
  }

  pub async fn confirm_order(&self, id: i64, items: &[OrderLine]) -> Result<(), MutationError> {
    self.perform(id, TableAction::ConfirmOrder, items).await
  }

  pub async fn send_to_kitchen(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::SendToKitchen, &[]).await
  }

  pub async fn start_preparation(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::StartPreparation, &[]).await
  }

  pub async fn mark_ready(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::MarkReady, &[]).await
  }

  pub async fn serve(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::Serve, &[]).await
  }

  pub async fn request_bill(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::RequestBill, &[]).await
  }

  pub async fn pay(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::Pay, &[]).await
  }

  pub async fn free(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::Free, &[]).await
  }

  pub async fn cancel_order(&self, id: i64) -> Result<(), MutationError> {
    self.perform(id, TableAction::CancelOrder, &[]).await
  }
}

/// Tables whose name starts with the zone `prefix` (case-insensitive).
pub fn tables_in_zone<'a>(tables: &'a [Table], prefix: &str) -> Vec<&'a Table> {
  tables.iter().filter(|table| table.in_zone(prefix)).collect()
}

pub fn tables_with_status(tables: &[Table], status: TableStatus) -> Vec<&Table> {
  tables.iter().filter(|table| table.status == status).collect()
}

/// What the kitchen has to work on, oldest order first.
pub fn kitchen_queue(tables: &[Table]) -> Vec<&Table> {
  let mut queue: Vec<&Table> = tables.iter().filter(|table| table.status.in_kitchen()).collect();
  queue.sort_by_key(|table| (table.occupied_at.is_none(), table.occupied_at, table.id));
  queue
}

use color_eyre::Result;
use std::sync::Arc;

use crate::api::RestaurantApi;
use crate::cache::CacheResult;
use crate::domain::Order;
use crate::error::{FetchError, QueryError};
use crate::query::{QueryClient, QueryConfig, QueryHandle};

/// Cache key of a table's current order.
pub fn order_key(table_id: i64) -> String {
  format!("order:{}", table_id)
}

/// The open or unpaid order per table, fetched on demand.
///
/// Cached separately from the table list: a table's status and its order's
/// status can disagree until both are refetched.
#[derive(Clone)]
pub struct OrdersResource {
  client: QueryClient,
  api: Arc<dyn RestaurantApi>,
  config: QueryConfig,
}

impl OrdersResource {
  pub fn new(client: QueryClient, api: Arc<dyn RestaurantApi>, config: QueryConfig) -> Self {
    Self {
      client,
      api,
      config,
    }
  }

  pub fn subscribe(&self, table_id: i64) -> Result<QueryHandle<Option<Order>>, QueryError> {
    let api = self.api.clone();
    self.client.use_query(
      &order_key(table_id),
      move || {
        let api = api.clone();
        async move { api.order_details(table_id).await }
      },
      self.config.clone(),
    )
  }

  pub async fn fetch(&self, table_id: i64) -> Result<CacheResult<Option<Order>>, FetchError> {
    self
      .client
      .fetch_query(
        &order_key(table_id),
        || self.api.order_details(table_id),
        &self.config,
      )
      .await
  }

  pub fn invalidate(&self, table_id: i64) {
    self.client.invalidate(&order_key(table_id));
  }
}

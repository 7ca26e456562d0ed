//! Remote boundary: the restaurant backend's REST surface.

mod http;
#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpApi;

use async_trait::async_trait;
use color_eyre::Result;

use crate::domain::{
  DeliveryOrder, DeliveryStatus, Ingredient, NewDelivery, Order, OrderLine, Table, TableAction,
};

/// Calls the sync engine makes against the backend.
///
/// Mutating calls report only success or failure: their response bodies
/// are never trusted as data, the affected collection is refetched instead.
#[async_trait]
pub trait RestaurantApi: Send + Sync {
  async fn tables(&self) -> Result<Vec<Table>>;

  /// Any bodiless table action (everything except confirming an order).
  async fn table_action(&self, table_id: i64, action: TableAction) -> Result<()>;

  async fn confirm_order(&self, table_id: i64, items: &[OrderLine]) -> Result<()>;

  /// The open or unpaid order of a table; `None` when there is none.
  async fn order_details(&self, table_id: i64) -> Result<Option<Order>>;

  async fn deliveries(&self) -> Result<Vec<DeliveryOrder>>;

  async fn create_delivery(&self, delivery: &NewDelivery) -> Result<DeliveryOrder>;

  async fn send_delivery_to_kitchen(&self, delivery_id: i64, items: &[OrderLine]) -> Result<()>;

  async fn update_delivery_status(&self, delivery_id: i64, status: DeliveryStatus) -> Result<()>;

  async fn ingredients(&self) -> Result<Vec<Ingredient>>;

  async fn update_ingredient(&self, ingredient: &Ingredient) -> Result<()>;

  /// Whether the backend answers at all.
  async fn ping(&self) -> bool;
}

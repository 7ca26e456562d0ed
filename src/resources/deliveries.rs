use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::{now, TABLES_KEY};
use crate::api::RestaurantApi;
use crate::cache::CacheResult;
use crate::domain::{DeliveryOrder, DeliveryStatus, NewDelivery};
use crate::error::{FetchError, MutationError, QueryError};
use crate::mutation::{mutate, patch_entity};
use crate::query::{QueryClient, QueryConfig, QueryHandle};

pub const DELIVERIES_KEY: &str = "all-deliveries";

/// Delivery orders from intake to the customer's door.
#[derive(Clone)]
pub struct DeliveriesResource {
  client: QueryClient,
  api: Arc<dyn RestaurantApi>,
  config: QueryConfig,
}

impl DeliveriesResource {
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

  pub fn subscribe(&self) -> Result<QueryHandle<Vec<DeliveryOrder>>, QueryError> {
    let api = self.api.clone();
    self.client.use_query(
      DELIVERIES_KEY,
      move || {
        let api = api.clone();
        async move { api.deliveries().await }
      },
      self.config.clone(),
    )
  }

  pub async fn fetch(&self) -> Result<CacheResult<Vec<DeliveryOrder>>, FetchError> {
    self
      .client
      .fetch_query(DELIVERIES_KEY, || self.api.deliveries(), &self.config)
      .await
  }

  pub fn cached(&self) -> Option<Vec<DeliveryOrder>> {
    self.client.get_query_data(DELIVERIES_KEY)
  }

  pub fn invalidate(&self) {
    self.client.invalidate(DELIVERIES_KEY);
  }

  /// Move a delivery one step along its lifecycle (or cancel it).
  pub async fn update_status(&self, id: i64, target: DeliveryStatus) -> Result<(), MutationError> {
    let now = now();
    let api = self.api.clone();

    mutate(
      &self.client,
      DELIVERIES_KEY,
      |deliveries: Option<Vec<DeliveryOrder>>| {
        patch_entity(DELIVERIES_KEY, deliveries, id, |delivery| {
          Ok(delivery.with_status(target, now)?)
        })
      },
      move || async move { api.update_delivery_status(id, target).await },
    )
    .await?;

    info!(delivery_id = id, status = %target, "Delivery updated");
    Ok(())
  }

  /// Hand a pending delivery to the kitchen, which opens a virtual table for it.
  pub async fn send_to_kitchen(&self, id: i64) -> Result<(), MutationError> {
    let delivery = self
      .cached()
      .and_then(|deliveries| deliveries.into_iter().find(|delivery| delivery.id == id))
      .ok_or(MutationError::NotCached {
        key: DELIVERIES_KEY.to_string(),
        entity: "delivery",
        id,
      })?;

    self.send_existing_to_kitchen(delivery).await
  }

  async fn send_existing_to_kitchen(&self, delivery: DeliveryOrder) -> Result<(), MutationError> {
    let now = now();
    let id = delivery.id;
    let lines = delivery.kitchen_lines();
    let api = self.api.clone();

    mutate(
      &self.client,
      DELIVERIES_KEY,
      |deliveries: Option<Vec<DeliveryOrder>>| {
        let mut deliveries = deliveries.unwrap_or_default();
        // A freshly created order may not have been refetched yet
        if !deliveries.iter().any(|existing| existing.id == id) {
          deliveries.push(delivery);
        }
        patch_entity(DELIVERIES_KEY, Some(deliveries), id, |delivery| {
          Ok(delivery.with_status(DeliveryStatus::Preparing, now)?)
        })
      },
      move || async move { api.send_delivery_to_kitchen(id, &lines).await },
    )
    .await?;

    info!(delivery_id = id, "Delivery sent to kitchen");
    self.client.invalidate(TABLES_KEY);
    Ok(())
  }

  /// Register a new delivery order. Not optimistic: the server assigns the id.
  pub async fn create(&self, delivery: &NewDelivery) -> Result<DeliveryOrder, MutationError> {
    if delivery.items.is_empty() {
      return Err(MutationError::invalid(DELIVERIES_KEY, "a delivery needs at least one item"));
    }

    let created = self
      .api
      .create_delivery(delivery)
      .await
      .map_err(|e| MutationError::rejected(DELIVERIES_KEY, e))?;

    info!(delivery_id = created.id, "Delivery created");
    self.invalidate();
    Ok(created)
  }

  /// Create a delivery and send it straight to the kitchen.
  ///
  /// If the second step fails the created order stays (the server has it)
  /// and the error says which id was created.
  pub async fn create_and_send_to_kitchen(&self, delivery: &NewDelivery) -> Result<DeliveryOrder, MutationError> {
    let created = self.create(delivery).await?;

    match self.send_existing_to_kitchen(created.clone()).await {
      Ok(()) => Ok(DeliveryOrder {
        status: DeliveryStatus::Preparing,
        ..created
      }),
      Err(e) => {
        warn!(delivery_id = created.id, error = %e, "Delivery created but not sent to kitchen");
        self.invalidate();
        Err(MutationError::PartiallyApplied {
          completed: format!("delivery #{} created", created.id),
          source: Box::new(e),
        })
      }
    }
  }
}

pub fn deliveries_with_status(deliveries: &[DeliveryOrder], status: DeliveryStatus) -> Vec<&DeliveryOrder> {
  deliveries.iter().filter(|delivery| delivery.status == status).collect()
}

/// Deliveries still on their way, oldest first.
pub fn active_deliveries(deliveries: &[DeliveryOrder]) -> Vec<&DeliveryOrder> {
  let mut active: Vec<&DeliveryOrder> = deliveries
    .iter()
    .filter(|delivery| !delivery.status.is_terminal())
    .collect();
  active.sort_by_key(|delivery| (delivery.created_at, delivery.id));
  active
}

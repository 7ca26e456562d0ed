//! Resource adapters: one cache key per backend collection, its polling
//! preset, the views derived from it and the mutations that change it.

mod deliveries;
mod inventory;
mod orders;
mod tables;

pub use deliveries::{active_deliveries, deliveries_with_status, DeliveriesResource, DELIVERIES_KEY};
pub use inventory::{InventoryResource, INGREDIENTS_KEY};
pub use orders::{order_key, OrdersResource};
pub use tables::{kitchen_queue, tables_in_zone, tables_with_status, TablesResource, TABLES_KEY};

use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

use crate::api::RestaurantApi;
use crate::query::{QueryClient, QueryConfig};

/// Query configs per resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfigs {
  pub tables: QueryConfig,
  pub deliveries: QueryConfig,
  pub ingredients: QueryConfig,
  pub orders: QueryConfig,
}

fn preset(stale_secs: u64, interval_secs: Option<u64>) -> QueryConfig {
  QueryConfig::default()
    .with_stale_time(Duration::from_secs(stale_secs))
    .with_refetch_interval(interval_secs.map(Duration::from_secs))
    .with_refetch_on_window_focus(true)
}

impl Default for ResourceConfigs {
  fn default() -> Self {
    Self {
      tables: preset(10, Some(15)),
      deliveries: preset(8, Some(12)),
      ingredients: preset(15, Some(20)),
      orders: preset(10, None),
    }
  }
}

/// Every adapter over one client and one backend.
#[derive(Clone)]
pub struct Resources {
  pub tables: TablesResource,
  pub orders: OrdersResource,
  pub deliveries: DeliveriesResource,
  pub inventory: InventoryResource,
}

impl Resources {
  pub fn new(client: QueryClient, api: Arc<dyn RestaurantApi>, configs: ResourceConfigs) -> Self {
    Self {
      tables: TablesResource::new(client.clone(), api.clone(), configs.tables),
      orders: OrdersResource::new(client.clone(), api.clone(), configs.orders),
      deliveries: DeliveriesResource::new(client.clone(), api.clone(), configs.deliveries),
      inventory: InventoryResource::new(client, api, configs.ingredients),
    }
  }
}

/// Wall-clock time in the backend's zone-less format.
pub(crate) fn now() -> NaiveDateTime {
  chrono::Local::now().naive_local()
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::api::fake::FakeApi;
  use crate::signals::LifecycleSignals;

  /// Presets without ambient triggers or retry delays, so tests only see
  /// the fetches they cause.
  pub(crate) fn quiet_configs() -> ResourceConfigs {
    let quiet = |config: QueryConfig| {
      config
        .with_refetch_on_window_focus(false)
        .with_refetch_on_reconnect(false)
        .with_retry(0, Duration::ZERO)
    };
    let defaults = ResourceConfigs::default();
    ResourceConfigs {
      tables: quiet(defaults.tables),
      deliveries: quiet(defaults.deliveries),
      ingredients: quiet(defaults.ingredients),
      orders: quiet(defaults.orders),
    }
  }

  pub(crate) fn resources(api: &Arc<FakeApi>) -> (QueryClient, Resources) {
    let client = QueryClient::new(LifecycleSignals::new());
    let api: Arc<dyn RestaurantApi> = api.clone();
    let resources = Resources::new(client.clone(), api, quiet_configs());
    (client, resources)
  }

  #[test]
  fn test_presets() {
    let configs = ResourceConfigs::default();
    assert_eq!(configs.tables.stale_time, Duration::from_secs(10));
    assert_eq!(configs.tables.refetch_interval, Some(Duration::from_secs(15)));
    assert_eq!(configs.deliveries.stale_time, Duration::from_secs(8));
    assert_eq!(configs.deliveries.refetch_interval, Some(Duration::from_secs(12)));
    assert_eq!(configs.ingredients.stale_time, Duration::from_secs(15));
    assert_eq!(configs.ingredients.refetch_interval, Some(Duration::from_secs(20)));
    assert_eq!(configs.orders.refetch_interval, None);
    assert!(configs.orders.refetch_on_window_focus);
  }
}

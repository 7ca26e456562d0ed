//! In-memory backend for tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::RestaurantApi;
use crate::domain::{
  DeliveryOrder, DeliveryStatus, Ingredient, NewDelivery, Order, OrderLine, Table, TableAction,
};

#[derive(Debug, Default)]
struct Backend {
  tables: Vec<Table>,
  orders: HashMap<i64, Order>,
  deliveries: Vec<DeliveryOrder>,
  ingredients: Vec<Ingredient>,
  next_delivery_id: i64,
}

/// Applies mutations to its own state the way the real backend would,
/// records every call, and fails on demand.
#[derive(Debug, Default)]
pub(crate) struct FakeApi {
  backend: Mutex<Backend>,
  calls: Mutex<Vec<String>>,
  /// Call names (e.g. "table_action") that fail while listed
  failing: Mutex<Vec<&'static str>>,
  /// Fail `update_ingredient` once this many calls succeeded
  ingredient_budget: Mutex<Option<usize>>,
  fetches: AtomicUsize,
  /// When set, mutating calls wait for a notification before answering
  gate: Mutex<Option<Arc<Notify>>>,
}

fn fixed_now() -> NaiveDateTime {
  chrono::DateTime::from_timestamp(1_714_590_000, 0)
    .map(|t| t.naive_utc())
    .unwrap_or_default()
}

impl FakeApi {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub(crate) fn with_tables(self: Arc<Self>, tables: Vec<Table>) -> Arc<Self> {
    self.backend.lock().unwrap().tables = tables;
    self
  }

  pub(crate) fn with_deliveries(self: Arc<Self>, deliveries: Vec<DeliveryOrder>) -> Arc<Self> {
    let mut backend = self.backend.lock().unwrap();
    backend.next_delivery_id = deliveries.iter().map(|d| d.id).max().unwrap_or(0) + 1;
    backend.deliveries = deliveries;
    drop(backend);
    self
  }

  pub(crate) fn with_ingredients(self: Arc<Self>, ingredients: Vec<Ingredient>) -> Arc<Self> {
    self.backend.lock().unwrap().ingredients = ingredients;
    self
  }

  pub(crate) fn with_order(self: Arc<Self>, order: Order) -> Arc<Self> {
    self.backend.lock().unwrap().orders.insert(order.table_id, order);
    self
  }

  pub(crate) fn fail(&self, call: &'static str) {
    self.failing.lock().unwrap().push(call);
  }

  pub(crate) fn fail_ingredient_updates_after(&self, successes: usize) {
    *self.ingredient_budget.lock().unwrap() = Some(successes);
  }

  /// Hold mutating calls until the returned notifier fires.
  pub(crate) fn gate(&self) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    *self.gate.lock().unwrap() = Some(notify.clone());
    notify
  }

  pub(crate) fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub(crate) fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  pub(crate) fn tables_now(&self) -> Vec<Table> {
    self.backend.lock().unwrap().tables.clone()
  }

  pub(crate) fn deliveries_now(&self) -> Vec<DeliveryOrder> {
    self.backend.lock().unwrap().deliveries.clone()
  }

  pub(crate) fn ingredients_now(&self) -> Vec<Ingredient> {
    self.backend.lock().unwrap().ingredients.clone()
  }

  fn record(&self, call: &'static str, detail: String) -> Result<()> {
    self.calls.lock().unwrap().push(format!("{} {}", call, detail).trim().to_string());
    if self.failing.lock().unwrap().contains(&call) {
      return Err(eyre!("{} failed: 500 Internal Server Error", call));
    }
    Ok(())
  }

  async fn wait_gate(&self) {
    let gate = self.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }
  }
}

#[async_trait]
impl RestaurantApi for FakeApi {
  async fn tables(&self) -> Result<Vec<Table>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.record("tables", String::new())?;
    Ok(self.tables_now())
  }

  async fn table_action(&self, table_id: i64, action: TableAction) -> Result<()> {
    self.wait_gate().await;
    self.record("table_action", format!("{} {}", table_id, action.endpoint()))?;

    let mut backend = self.backend.lock().unwrap();
    let table = backend
      .tables
      .iter_mut()
      .find(|table| table.id == table_id)
      .ok_or_else(|| eyre!("Mesa no encontrada"))?;
    *table = table.apply(action, fixed_now())?;
    Ok(())
  }

  async fn confirm_order(&self, table_id: i64, items: &[OrderLine]) -> Result<()> {
    self.wait_gate().await;
    self.record("confirm_order", format!("{} {}", table_id, items.len()))?;
    if items.is_empty() {
      return Err(eyre!("400 Debe agregar al menos un producto"));
    }

    let mut backend = self.backend.lock().unwrap();
    let table = backend
      .tables
      .iter_mut()
      .find(|table| table.id == table_id)
      .ok_or_else(|| eyre!("Mesa no encontrada"))?;
    *table = table.apply(TableAction::ConfirmOrder, fixed_now())?;
    Ok(())
  }

  async fn order_details(&self, table_id: i64) -> Result<Option<Order>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.record("order_details", table_id.to_string())?;
    Ok(self.backend.lock().unwrap().orders.get(&table_id).cloned())
  }

  async fn deliveries(&self) -> Result<Vec<DeliveryOrder>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.record("deliveries", String::new())?;
    Ok(self.deliveries_now())
  }

  async fn create_delivery(&self, delivery: &NewDelivery) -> Result<DeliveryOrder> {
    self.record("create_delivery", delivery.customer_name.clone())?;

    let mut backend = self.backend.lock().unwrap();
    backend.next_delivery_id = backend.next_delivery_id.max(1);
    let created = DeliveryOrder {
      id: backend.next_delivery_id,
      customer_name: delivery.customer_name.clone(),
      phone: delivery.phone.clone(),
      address: delivery.address.clone(),
      reference: delivery.reference.clone(),
      notes: delivery.notes.clone(),
      status: DeliveryStatus::Pending,
      items: delivery.items.clone(),
      total_amount: Some(delivery.total()),
      created_at: Some(fixed_now()),
      ready_at: None,
      dispatched_at: None,
      delivered_at: None,
    };
    backend.next_delivery_id += 1;
    backend.deliveries.push(created.clone());
    Ok(created)
  }

  async fn send_delivery_to_kitchen(&self, delivery_id: i64, items: &[OrderLine]) -> Result<()> {
    self.wait_gate().await;
    self.record("send_delivery_to_kitchen", format!("{} {}", delivery_id, items.len()))?;
    self.move_delivery(delivery_id, DeliveryStatus::Preparing)
  }

  async fn update_delivery_status(&self, delivery_id: i64, status: DeliveryStatus) -> Result<()> {
    self.wait_gate().await;
    self.record("update_delivery_status", format!("{} {}", delivery_id, status.as_param()))?;
    self.move_delivery(delivery_id, status)
  }

  async fn ingredients(&self) -> Result<Vec<Ingredient>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    self.record("ingredients", String::new())?;
    Ok(self.ingredients_now())
  }

  async fn update_ingredient(&self, ingredient: &Ingredient) -> Result<()> {
    self.wait_gate().await;
    self.record("update_ingredient", format!("{} {}", ingredient.id, ingredient.stock))?;
    {
      let mut budget = self.ingredient_budget.lock().unwrap();
      match budget.as_mut() {
        Some(0) => return Err(eyre!("update_ingredient failed: 503 Service Unavailable")),
        Some(left) => *left -= 1,
        None => {}
      }
    }

    let mut backend = self.backend.lock().unwrap();
    let slot = backend
      .ingredients
      .iter_mut()
      .find(|existing| existing.id == ingredient.id)
      .ok_or_else(|| eyre!("Insumo no encontrado"))?;
    *slot = ingredient.clone();
    Ok(())
  }

  async fn ping(&self) -> bool {
    !self.failing.lock().unwrap().contains(&"ping")
  }
}

impl FakeApi {
  fn move_delivery(&self, delivery_id: i64, status: DeliveryStatus) -> Result<()> {
    let mut backend = self.backend.lock().unwrap();
    let delivery = backend
      .deliveries
      .iter_mut()
      .find(|delivery| delivery.id == delivery_id)
      .ok_or_else(|| eyre!("Pedido no encontrado"))?;
    *delivery = delivery.with_status(status, fixed_now())?;
    Ok(())
  }
}

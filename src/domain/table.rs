//! Dining table lifecycle.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::timer::Elapsed;
use crate::cache::Cacheable;
use crate::error::IllegalTransition;

/// Prefix of the virtual kitchen tables created for delivery orders.
pub const DELIVERY_TABLE_PREFIX: &str = "DELIVERY #";

/// Where a table is in its service cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
  Available,
  Occupied,
  ReadyToKitchen,
  WaitingKitchen,
  Preparing,
  Ready,
  Serving,
  WaitingPayment,
}

impl TableStatus {
  pub const ALL: [TableStatus; 8] = [
    TableStatus::Available,
    TableStatus::Occupied,
    TableStatus::ReadyToKitchen,
    TableStatus::WaitingKitchen,
    TableStatus::Preparing,
    TableStatus::Ready,
    TableStatus::Serving,
    TableStatus::WaitingPayment,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      TableStatus::Available => "AVAILABLE",
      TableStatus::Occupied => "OCCUPIED",
      TableStatus::ReadyToKitchen => "READY_TO_KITCHEN",
      TableStatus::WaitingKitchen => "WAITING_KITCHEN",
      TableStatus::Preparing => "PREPARING",
      TableStatus::Ready => "READY",
      TableStatus::Serving => "SERVING",
      TableStatus::WaitingPayment => "WAITING_PAYMENT",
    }
  }

  /// Status after `action`, or why `action` is not allowed here.
  pub fn apply(self, action: TableAction) -> Result<TableStatus, IllegalTransition> {
    if action.allowed_from().contains(&self) {
      Ok(action.target())
    } else {
      Err(IllegalTransition {
        entity: "table",
        action: action.as_str(),
        from: self.as_str(),
      })
    }
  }

  /// Actions a waiter or cook could take from this status.
  pub fn available_actions(self) -> Vec<TableAction> {
    TableAction::ALL
      .into_iter()
      .filter(|action| action.allowed_from().contains(&self))
      .collect()
  }

  /// The order is the kitchen's responsibility.
  pub fn in_kitchen(self) -> bool {
    matches!(
      self,
      TableStatus::WaitingKitchen | TableStatus::Preparing | TableStatus::Ready
    )
  }
}

impl fmt::Display for TableStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A state change requested for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableAction {
  Occupy,
  ConfirmOrder,
  SendToKitchen,
  StartPreparation,
  MarkReady,
  Serve,
  RequestBill,
  Pay,
  Free,
  CancelOrder,
}

impl TableAction {
  pub const ALL: [TableAction; 10] = [
    TableAction::Occupy,
    TableAction::ConfirmOrder,
    TableAction::SendToKitchen,
    TableAction::StartPreparation,
    TableAction::MarkReady,
    TableAction::Serve,
    TableAction::RequestBill,
    TableAction::Pay,
    TableAction::Free,
    TableAction::CancelOrder,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      TableAction::Occupy => "occupy",
      TableAction::ConfirmOrder => "confirm-order",
      TableAction::SendToKitchen => "send-to-kitchen",
      TableAction::StartPreparation => "start-preparation",
      TableAction::MarkReady => "mark-ready",
      TableAction::Serve => "serve",
      TableAction::RequestBill => "request-bill",
      TableAction::Pay => "pay",
      TableAction::Free => "free",
      TableAction::CancelOrder => "cancel-order",
    }
  }

  /// Path segment under `api/tables/{id}/`.
  pub fn endpoint(self) -> &'static str {
    match self {
      TableAction::ConfirmOrder => "confirm",
      TableAction::MarkReady => "ready",
      other => other.as_str(),
    }
  }

  pub fn allowed_from(self) -> &'static [TableStatus] {
    use TableStatus::*;
    match self {
      TableAction::Occupy => &[Available],
      TableAction::ConfirmOrder => &[Occupied],
      TableAction::SendToKitchen => &[ReadyToKitchen],
      TableAction::StartPreparation => &[WaitingKitchen],
      TableAction::MarkReady => &[Preparing],
      TableAction::Serve => &[Ready],
      TableAction::RequestBill => &[Serving],
      TableAction::Pay => &[WaitingPayment],
      TableAction::Free => &[
        Occupied,
        ReadyToKitchen,
        WaitingKitchen,
        Preparing,
        Ready,
        Serving,
        WaitingPayment,
      ],
      TableAction::CancelOrder => &[Occupied, ReadyToKitchen, WaitingKitchen],
    }
  }

  pub fn target(self) -> TableStatus {
    match self {
      TableAction::Occupy => TableStatus::Occupied,
      TableAction::ConfirmOrder => TableStatus::ReadyToKitchen,
      TableAction::SendToKitchen => TableStatus::WaitingKitchen,
      TableAction::StartPreparation => TableStatus::Preparing,
      TableAction::MarkReady => TableStatus::Ready,
      TableAction::Serve => TableStatus::Serving,
      TableAction::RequestBill => TableStatus::WaitingPayment,
      TableAction::Pay | TableAction::Free | TableAction::CancelOrder => TableStatus::Available,
    }
  }

  /// Whether the action opens, settles or discards the table's order.
  pub fn touches_order(self) -> bool {
    matches!(
      self,
      TableAction::ConfirmOrder
        | TableAction::RequestBill
        | TableAction::Pay
        | TableAction::Free
        | TableAction::CancelOrder
    )
  }
}

impl fmt::Display for TableAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Accepts both the action name and its endpoint segment.
impl FromStr for TableAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim().to_ascii_lowercase();
    TableAction::ALL
      .into_iter()
      .find(|action| action.as_str() == s || action.endpoint() == s)
      .ok_or_else(|| format!("unknown table action `{}`", s))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub capacity: u32,
  pub status: TableStatus,
  /// Set when the order is confirmed
  #[serde(default)]
  pub occupied_at: Option<NaiveDateTime>,
  /// Set when the kitchen starts cooking
  #[serde(default)]
  pub preparation_at: Option<NaiveDateTime>,
}

impl Table {
  /// The table as the server will report it after `action` at `now`.
  pub fn apply(&self, action: TableAction, now: NaiveDateTime) -> Result<Table, IllegalTransition> {
    let status = self.status.apply(action)?;
    let mut next = Table {
      status,
      ..self.clone()
    };

    match action {
      TableAction::Occupy => next.occupied_at = None,
      TableAction::ConfirmOrder => next.occupied_at = Some(now),
      TableAction::StartPreparation => next.preparation_at = Some(now),
      TableAction::Pay | TableAction::Free | TableAction::CancelOrder => {
        next.occupied_at = None;
        next.preparation_at = None;
      }
      _ => {}
    }
    Ok(next)
  }

  /// Zone letter the name starts with (`S` salon, `P` patio, ...).
  pub fn zone(&self) -> Option<char> {
    self.name.trim_start().chars().next()
  }

  pub fn in_zone(&self, prefix: &str) -> bool {
    self
      .name
      .trim_start()
      .to_uppercase()
      .starts_with(&prefix.trim().to_uppercase())
  }

  /// Delivery order id behind a virtual kitchen table.
  pub fn delivery_id(&self) -> Option<i64> {
    self.name.strip_prefix(DELIVERY_TABLE_PREFIX)?.trim().parse().ok()
  }

  pub fn is_delivery(&self) -> bool {
    self.delivery_id().is_some()
  }

  pub fn occupied_for(&self, now: NaiveDateTime) -> Option<Elapsed> {
    self.occupied_at.map(|start| Elapsed::between(start, now))
  }

  pub fn preparing_for(&self, now: NaiveDateTime) -> Option<Elapsed> {
    self.preparation_at.map(|start| Elapsed::between(start, now))
  }
}

impl Cacheable for Table {
  fn cache_key(&self) -> i64 {
    self.id
  }

  fn entity_type() -> &'static str {
    "table"
  }
}

//! Delivery orders and their dispatch lifecycle.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::order::OrderLine;
use crate::cache::Cacheable;
use crate::error::IllegalTransition;

/// Lower case on our side; the backend answers in upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
  #[serde(alias = "PENDING")]
  Pending,
  #[serde(alias = "PREPARING")]
  Preparing,
  #[serde(alias = "READY")]
  Ready,
  #[serde(alias = "DISPATCHED")]
  Dispatched,
  #[serde(alias = "DELIVERED")]
  Delivered,
  #[serde(alias = "CANCELLED")]
  Cancelled,
}

impl DeliveryStatus {
  pub const ALL: [DeliveryStatus; 6] = [
    DeliveryStatus::Pending,
    DeliveryStatus::Preparing,
    DeliveryStatus::Ready,
    DeliveryStatus::Dispatched,
    DeliveryStatus::Delivered,
    DeliveryStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      DeliveryStatus::Pending => "pending",
      DeliveryStatus::Preparing => "preparing",
      DeliveryStatus::Ready => "ready",
      DeliveryStatus::Dispatched => "dispatched",
      DeliveryStatus::Delivered => "delivered",
      DeliveryStatus::Cancelled => "cancelled",
    }
  }

  /// Query parameter value the status endpoint expects.
  pub fn as_param(self) -> String {
    self.as_str().to_uppercase()
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
  }

  /// Next step on the happy path.
  pub fn next(self) -> Option<DeliveryStatus> {
    match self {
      DeliveryStatus::Pending => Some(DeliveryStatus::Preparing),
      DeliveryStatus::Preparing => Some(DeliveryStatus::Ready),
      DeliveryStatus::Ready => Some(DeliveryStatus::Dispatched),
      DeliveryStatus::Dispatched => Some(DeliveryStatus::Delivered),
      DeliveryStatus::Delivered | DeliveryStatus::Cancelled => None,
    }
  }

  /// One step forward, or cancellation from any open status.
  pub fn transition_to(self, target: DeliveryStatus) -> Result<DeliveryStatus, IllegalTransition> {
    let allowed = match target {
      DeliveryStatus::Cancelled => !self.is_terminal(),
      target => self.next() == Some(target),
    };

    if allowed {
      Ok(target)
    } else {
      Err(IllegalTransition {
        entity: "delivery",
        action: target.verb(),
        from: self.as_str(),
      })
    }
  }

  fn verb(self) -> &'static str {
    match self {
      DeliveryStatus::Pending => "reopen",
      DeliveryStatus::Preparing => "start preparing",
      DeliveryStatus::Ready => "mark ready",
      DeliveryStatus::Dispatched => "dispatch",
      DeliveryStatus::Delivered => "deliver",
      DeliveryStatus::Cancelled => "cancel",
    }
  }
}

impl fmt::Display for DeliveryStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeliveryStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim().to_ascii_lowercase();
    DeliveryStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| format!("unknown delivery status `{}`", s))
  }
}

/// One product line of a delivery.
///
/// Created orders send `price`; the backend answers with `unitPrice` and
/// its own `subtotal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryItem {
  pub product_id: i64,
  #[serde(default)]
  pub product_name: String,
  pub quantity: u32,
  #[serde(rename = "price", alias = "unitPrice", with = "rust_decimal::serde::float")]
  pub unit_price: Decimal,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "rust_decimal::serde::float_option"
  )]
  pub subtotal: Option<Decimal>,
}

impl DeliveryItem {
  /// Subtotal as reported, or unit price times quantity.
  pub fn line_total(&self) -> Decimal {
    self
      .subtotal
      .unwrap_or_else(|| self.unit_price * Decimal::from(self.quantity))
  }

  pub fn line(&self) -> OrderLine {
    OrderLine::new(self.product_id, self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOrder {
  pub id: i64,
  pub customer_name: String,
  pub phone: String,
  pub address: String,
  #[serde(default)]
  pub reference: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
  pub status: DeliveryStatus,
  /// Sent as null when the order has no lines
  #[serde(default, deserialize_with = "null_as_empty")]
  pub items: Vec<DeliveryItem>,
  #[serde(default, with = "rust_decimal::serde::float_option")]
  pub total_amount: Option<Decimal>,
  #[serde(default)]
  pub created_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub ready_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub dispatched_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub delivered_at: Option<NaiveDateTime>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: serde::Deserializer<'de>,
  T: Deserialize<'de>,
{
  Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl DeliveryOrder {
  /// The order after moving to `target` at `now`, stamping the matching timestamp.
  pub fn with_status(&self, target: DeliveryStatus, now: NaiveDateTime) -> Result<Self, IllegalTransition> {
    let status = self.status.transition_to(target)?;
    let mut next = DeliveryOrder {
      status,
      ..self.clone()
    };

    match status {
      DeliveryStatus::Ready => next.ready_at = Some(now),
      DeliveryStatus::Dispatched => next.dispatched_at = Some(now),
      DeliveryStatus::Delivered => next.delivered_at = Some(now),
      _ => {}
    }
    Ok(next)
  }

  pub fn total(&self) -> Decimal {
    self
      .total_amount
      .unwrap_or_else(|| self.items.iter().map(DeliveryItem::line_total).sum())
  }

  /// Lines to hand to the kitchen.
  pub fn kitchen_lines(&self) -> Vec<OrderLine> {
    self.items.iter().map(DeliveryItem::line).collect()
  }
}

impl Cacheable for DeliveryOrder {
  fn cache_key(&self) -> i64 {
    self.id
  }

  fn entity_type() -> &'static str {
    "delivery"
  }
}

/// A delivery order as taken over the phone, before the server assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
  pub customer_name: String,
  pub phone: String,
  pub address: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub items: Vec<DeliveryItem>,
}

impl NewDelivery {
  pub fn total(&self) -> Decimal {
    self.items.iter().map(DeliveryItem::line_total).sum()
  }
}

/// Body of the send-to-kitchen call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KitchenTicket {
  pub items: Vec<OrderLine>,
}

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IllegalTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  /// Kitchen orders created for deliveries start as PENDING on the backend
  #[serde(alias = "PENDING")]
  Open,
  WaitingPayment,
  Paid,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Open => "OPEN",
      OrderStatus::WaitingPayment => "WAITING_PAYMENT",
      OrderStatus::Paid => "PAID",
    }
  }

  pub fn request_bill(self) -> Result<Self, IllegalTransition> {
    match self {
      OrderStatus::Open => Ok(OrderStatus::WaitingPayment),
      other => Err(other.illegal("request the bill for")),
    }
  }

  pub fn pay(self) -> Result<Self, IllegalTransition> {
    match self {
      OrderStatus::WaitingPayment => Ok(OrderStatus::Paid),
      other => Err(other.illegal("pay")),
    }
  }

  pub fn is_settled(self) -> bool {
    self == OrderStatus::Paid
  }

  fn illegal(self, action: &'static str) -> IllegalTransition {
    IllegalTransition {
      entity: "order",
      action,
      from: self.as_str(),
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  #[serde(default)]
  pub id: Option<i64>,
  pub product_id: i64,
  pub product_name: String,
  pub quantity: u32,
  #[serde(with = "rust_decimal::serde::float")]
  pub unit_price: Decimal,
  #[serde(with = "rust_decimal::serde::float")]
  pub subtotal: Decimal,
}

/// The open or unpaid order of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: i64,
  pub table_id: i64,
  #[serde(default)]
  pub table_name: Option<String>,
  pub status: OrderStatus,
  #[serde(default, with = "rust_decimal::serde::float_option")]
  pub total_amount: Option<Decimal>,
  #[serde(default)]
  pub created_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub paid_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub items: Vec<OrderItem>,
}

impl Order {
  /// Total as reported, or the sum of line subtotals when missing.
  pub fn total(&self) -> Decimal {
    self
      .total_amount
      .unwrap_or_else(|| self.items.iter().map(|item| item.subtotal).sum())
  }

  pub fn item_count(&self) -> u32 {
    self.items.iter().map(|item| item.quantity).sum()
  }
}

/// One product line sent when confirming a table or cooking a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub product_id: i64,
  pub quantity: u32,
}

impl OrderLine {
  pub fn new(product_id: i64, quantity: u32) -> Self {
    Self {
      product_id,
      quantity,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;

  #[test]
  fn test_order_status_moves_forward_only() {
    let waiting = OrderStatus::Open.request_bill().unwrap();
    assert_eq!(waiting, OrderStatus::WaitingPayment);
    assert!(waiting.request_bill().is_err());

    let paid = waiting.pay().unwrap();
    assert!(paid.is_settled());
    assert!(OrderStatus::Open.pay().is_err());
  }

  #[test]
  fn test_deserialize_order_details() {
    let json = r#"{
      "id": 11,
      "tableId": 3,
      "tableName": "S3",
      "tableNumber": 3,
      "status": "OPEN",
      "totalAmount": 31.5,
      "createdAt": "2024-05-01T20:00:00",
      "items": [
        {"id": 1, "productId": 4, "productName": "Lomo saltado", "quantity": 1, "unitPrice": 25.0, "subtotal": 25.0},
        {"id": 2, "productId": 9, "productName": "Chicha", "quantity": 1, "unitPrice": 6.5, "subtotal": 6.5}
      ]
    }"#;

    let order: Order = serde_json::from_str(json).unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.total(), Decimal::from_str("31.5").unwrap());
    assert_eq!(order.item_count(), 2);
  }

  #[test]
  fn test_total_falls_back_to_line_sum() {
    let order = Order {
      id: 1,
      table_id: 1,
      table_name: None,
      status: OrderStatus::Open,
      total_amount: None,
      created_at: None,
      paid_at: None,
      items: vec![OrderItem {
        id: None,
        product_id: 1,
        product_name: "Ceviche".to_string(),
        quantity: 2,
        unit_price: Decimal::new(1800, 2),
        subtotal: Decimal::new(3600, 2),
      }],
    };
    assert_eq!(order.total(), Decimal::new(36, 0));
  }

  #[test]
  fn test_pending_kitchen_order_reads_as_open() {
    let status: OrderStatus = serde_json::from_str("\"PENDING\"").unwrap();
    assert_eq!(status, OrderStatus::Open);
  }
}

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::RestaurantApi;
use crate::config::ApiConfig;
use crate::domain::{
  DeliveryOrder, DeliveryStatus, Ingredient, KitchenTicket, NewDelivery, Order, OrderLine, Table,
  TableAction,
};

/// Restaurant backend client over HTTP
#[derive(Debug, Clone)]
pub struct HttpApi {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpApi {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
    // Without the trailing slash `join` would replace the last path segment
    let mut base = config.url.trim_end_matches('/').to_string();
    base.push('/');
    let base_url = Url::parse(&base).map_err(|e| eyre!("Invalid API url {}: {}", config.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    if token.is_none() {
      debug!("No API token configured, sending unauthenticated requests");
    }

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
    let url = self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))?;

    let builder = self.client.request(method, url);
    Ok(match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    })
  }

  async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", what, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("Failed to {}: {} {}", what, status, body));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", what, e))
  }

  async fn send_ack(&self, builder: RequestBuilder, what: &str) -> Result<()> {
    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to {}: {}", what, e))?;

    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      let body = response.text().await.unwrap_or_default();
      Err(eyre!("Failed to {}: {} {}", what, status, body))
    }
  }
}

#[async_trait]
impl RestaurantApi for HttpApi {
  #[instrument(skip(self))]
  async fn tables(&self) -> Result<Vec<Table>> {
    let request = self.request(Method::GET, "api/tables")?;
    self.send_json(request, "get tables").await
  }

  #[instrument(skip(self))]
  async fn table_action(&self, table_id: i64, action: TableAction) -> Result<()> {
    if action == TableAction::ConfirmOrder {
      return Err(eyre!("Confirming an order needs its items"));
    }
    let path = format!("api/tables/{}/{}", table_id, action.endpoint());
    let request = self.request(Method::POST, &path)?;
    self.send_ack(request, &format!("{} table {}", action, table_id)).await
  }

  #[instrument(skip(self, items), fields(lines = items.len()))]
  async fn confirm_order(&self, table_id: i64, items: &[OrderLine]) -> Result<()> {
    let path = format!("api/tables/{}/confirm", table_id);
    let request = self.request(Method::POST, &path)?.json(items);
    self.send_ack(request, &format!("confirm order of table {}", table_id)).await
  }

  #[instrument(skip(self))]
  async fn order_details(&self, table_id: i64) -> Result<Option<Order>> {
    let path = format!("api/tables/{}/order-details", table_id);
    let response = self
      .request(Method::GET, &path)?
      .send()
      .await
      .map_err(|e| eyre!("Failed to get order of table {}: {}", table_id, e))?;

    match response.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => response
        .json::<Order>()
        .await
        .map(Some)
        .map_err(|e| eyre!("Failed to parse order of table {}: {}", table_id, e)),
      status => Err(eyre!("Failed to get order of table {}: {}", table_id, status)),
    }
  }

  #[instrument(skip(self))]
  async fn deliveries(&self) -> Result<Vec<DeliveryOrder>> {
    let request = self.request(Method::GET, "api/delivery")?;
    self.send_json(request, "get deliveries").await
  }

  #[instrument(skip(self, delivery), fields(customer = %delivery.customer_name))]
  async fn create_delivery(&self, delivery: &NewDelivery) -> Result<DeliveryOrder> {
    let request = self.request(Method::POST, "api/delivery/create")?.json(delivery);
    self.send_json(request, "create delivery").await
  }

  #[instrument(skip(self, items), fields(lines = items.len()))]
  async fn send_delivery_to_kitchen(&self, delivery_id: i64, items: &[OrderLine]) -> Result<()> {
    let path = format!("api/delivery/{}/send-to-kitchen", delivery_id);
    let ticket = KitchenTicket {
      items: items.to_vec(),
    };
    let request = self.request(Method::POST, &path)?.json(&ticket);
    self
      .send_ack(request, &format!("send delivery {} to kitchen", delivery_id))
      .await
  }

  #[instrument(skip(self))]
  async fn update_delivery_status(&self, delivery_id: i64, status: DeliveryStatus) -> Result<()> {
    let path = format!("api/delivery/{}/status", delivery_id);
    let request = self
      .request(Method::PUT, &path)?
      .query(&[("status", status.as_param())]);
    self
      .send_ack(request, &format!("set delivery {} to {}", delivery_id, status))
      .await
  }

  #[instrument(skip(self))]
  async fn ingredients(&self) -> Result<Vec<Ingredient>> {
    let request = self.request(Method::GET, "api/inventory")?;
    self.send_json(request, "get ingredients").await
  }

  #[instrument(skip(self, ingredient), fields(id = ingredient.id))]
  async fn update_ingredient(&self, ingredient: &Ingredient) -> Result<()> {
    let path = format!("api/inventory/{}", ingredient.id);
    let request = self.request(Method::PUT, &path)?.json(ingredient);
    self
      .send_ack(request, &format!("update ingredient {}", ingredient.id))
      .await
  }

  async fn ping(&self) -> bool {
    match self.request(Method::GET, "") {
      Ok(request) => request.send().await.is_ok(),
      Err(_) => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(url: &str) -> ApiConfig {
    ApiConfig {
      url: url.to_string(),
      ..ApiConfig::default()
    }
  }

  #[test]
  fn test_base_url_keeps_path_prefix() {
    let api = HttpApi::new(&config("http://pos.local:8080/backend"), None).unwrap();
    let url = api.base_url().join("api/tables").unwrap();
    assert_eq!(url.as_str(), "http://pos.local:8080/backend/api/tables");
  }

  #[test]
  fn test_invalid_url_rejected() {
    assert!(HttpApi::new(&config("not a url"), None).is_err());
  }

  #[test]
  fn test_status_update_uses_upper_case_param() {
    let api = HttpApi::new(&config("http://localhost:8080"), Some("t0k3n".to_string())).unwrap();
    let request = api
      .request(Method::PUT, "api/delivery/5/status")
      .unwrap()
      .query(&[("status", DeliveryStatus::Ready.as_param())])
      .build()
      .unwrap();

    assert_eq!(
      request.url().as_str(),
      "http://localhost:8080/api/delivery/5/status?status=READY"
    );
    let auth = request.headers().get(reqwest::header::AUTHORIZATION).unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer t0k3n");
  }
}

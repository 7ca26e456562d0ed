//! Ingredient stock and recipe consumption.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cache::Cacheable;
use crate::error::StockError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
  pub id: i64,
  pub name: String,
  pub unit: String,
  #[serde(with = "rust_decimal::serde::float")]
  pub stock: Decimal,
  #[serde(alias = "minStock", with = "rust_decimal::serde::float")]
  pub low_stock_threshold: Decimal,
  #[serde(default, with = "rust_decimal::serde::float_option")]
  pub cost: Option<Decimal>,
}

impl Ingredient {
  pub fn is_low_stock(&self) -> bool {
    self.stock <= self.low_stock_threshold
  }
}

impl Cacheable for Ingredient {
  fn cache_key(&self) -> i64 {
    self.id
  }

  fn entity_type() -> &'static str {
    "ingredient"
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
  pub ingredient_id: i64,
  #[serde(with = "rust_decimal::serde::float")]
  pub quantity: Decimal,
}

/// What one dish takes out of the pantry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
  pub id: i64,
  pub name: String,
  #[serde(rename = "ingredients")]
  pub lines: Vec<RecipeLine>,
}

impl Recipe {
  /// Total quantity per ingredient, merging repeated lines.
  pub fn requirements(&self) -> HashMap<i64, Decimal> {
    let mut required = HashMap::new();
    for line in &self.lines {
      *required.entry(line.ingredient_id).or_insert(Decimal::ZERO) += line.quantity;
    }
    required
  }
}

/// Set one ingredient's stock to `stock`.
pub fn adjust_stock(ingredients: &[Ingredient], id: i64, stock: Decimal) -> Result<Vec<Ingredient>, StockError> {
  if stock < Decimal::ZERO {
    return Err(StockError::NegativeStock(id));
  }
  if !ingredients.iter().any(|ingredient| ingredient.id == id) {
    return Err(StockError::UnknownIngredient(id));
  }

  Ok(
    ingredients
      .iter()
      .map(|ingredient| {
        if ingredient.id == id {
          Ingredient {
            stock,
            ..ingredient.clone()
          }
        } else {
          ingredient.clone()
        }
      })
      .collect(),
  )
}

/// Take one portion of `recipe` out of stock: every line or none.
pub fn consume_recipe(ingredients: &[Ingredient], recipe: &Recipe) -> Result<Vec<Ingredient>, StockError> {
  let required = recipe.requirements();

  let mut ids: Vec<&i64> = required.keys().collect();
  ids.sort();
  for &id in ids {
    let ingredient = ingredients
      .iter()
      .find(|ingredient| ingredient.id == id)
      .ok_or(StockError::UnknownIngredient(id))?;
    let needed = required[&id];
    if ingredient.stock < needed {
      return Err(StockError::InsufficientStock {
        ingredient_id: id,
        required: needed,
        available: ingredient.stock,
      });
    }
  }

  Ok(
    ingredients
      .iter()
      .map(|ingredient| match required.get(&ingredient.id) {
        Some(needed) => Ingredient {
          stock: ingredient.stock - needed,
          ..ingredient.clone()
        },
        None => ingredient.clone(),
      })
      .collect(),
  )
}

pub fn low_stock(ingredients: &[Ingredient]) -> Vec<&Ingredient> {
  ingredients.iter().filter(|ingredient| ingredient.is_low_stock()).collect()
}

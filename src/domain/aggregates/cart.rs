//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::value_objects::Quantity;
use crate::store::{Document, UniqueKey};

/// A customer's cart. `total_amount` is derived from current catalog prices
/// by [`Cart::reprice`] and never taken from the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: Uuid,
    owner_id: Uuid,
    items: Vec<CartItem>,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

impl Cart {
    pub fn for_owner(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), owner_id, items: vec![], total_amount: Decimal::ZERO, created_at: now, updated_at: now }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner_id(&self) -> Uuid { self.owner_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn total_amount(&self) -> Decimal { self.total_amount }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn product_ids(&self) -> Vec<Uuid> { self.items.iter().map(|i| i.product_id).collect() }

    /// Adds to an existing line for the product, or appends a new line.
    pub fn add_item(&mut self, product_id: Uuid, quantity: Quantity) -> Result<(), CartError> {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity = existing.quantity.add(quantity).map_err(|_| CartError::QuantityOverflow)?;
        } else {
            self.items.push(CartItem { product_id, quantity });
        }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound(product_id)); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.total_amount = Decimal::ZERO; self.touch(); }

    /// Recomputes the total from the given unit prices.
    pub fn reprice(&mut self, prices: &HashMap<Uuid, Decimal>) -> Result<(), CartError> {
        let mut total = Decimal::ZERO;
        for item in &self.items {
            let price = prices.get(&item.product_id).ok_or(CartError::UnknownProduct(item.product_id))?;
            total = item.quantity.times(*price).and_then(|line| total.checked_add(line)).ok_or(CartError::TotalOverflow)?;
        }
        self.total_amount = total;
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Document for Cart {
    const COLLECTION: &'static str = "carts";
    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey::on("owner", &["owner_id"])];
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone)] pub enum CartError { ItemNotFound(Uuid), UnknownProduct(Uuid), QuantityOverflow, TotalOverflow }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound(id) => write!(f, "Panel {id} not found in cart"),
            Self::UnknownProduct(id) => write!(f, "Panel {id} in cart no longer exists"),
            Self::QuantityOverflow => write!(f, "Quantity is too large"),
            Self::TotalOverflow => write!(f, "Cart total is too large"),
        }
    }
}

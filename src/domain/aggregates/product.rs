//! Product Aggregate (solar panel)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::store::Document;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    id: Uuid,
    name: String,
    capacity_kw: Decimal,
    price: Decimal,
    description: Option<String>,
    suitable_for: SuitableFor,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuitableFor { Home, Commercial }

#[derive(Clone, Debug, Deserialize)]
pub struct NewProduct { pub name: String, pub capacity_kw: Decimal, pub price: Decimal, pub description: Option<String>, pub suitable_for: SuitableFor }

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub capacity_kw: Option<Decimal>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub suitable_for: Option<SuitableFor>,
    pub is_active: Option<bool>,
}

impl Product {
    pub const NAME_MAX: usize = 100;
    pub const DESCRIPTION_MAX: usize = 500;

    pub fn create(new: NewProduct) -> Result<Self, ProductError> {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), name: String::new(), capacity_kw: Decimal::ZERO, price: Decimal::ZERO,
            description: None, suitable_for: new.suitable_for, is_active: true, created_at: now, updated_at: now,
        };
        product.set_name(new.name)?;
        product.set_capacity(new.capacity_kw)?;
        product.set_price(new.price)?;
        product.set_description(new.description)?;
        Ok(product)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn capacity_kw(&self) -> Decimal { self.capacity_kw }
    pub fn price(&self) -> Decimal { self.price }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn suitable_for(&self) -> SuitableFor { self.suitable_for }
    pub fn is_active(&self) -> bool { self.is_active }

    pub fn apply(&mut self, patch: ProductPatch) -> Result<(), ProductError> {
        if let Some(name) = patch.name { self.set_name(name)?; }
        if let Some(capacity) = patch.capacity_kw { self.set_capacity(capacity)?; }
        if let Some(price) = patch.price { self.set_price(price)?; }
        if patch.description.is_some() { self.set_description(patch.description)?; }
        if let Some(suitable_for) = patch.suitable_for { self.suitable_for = suitable_for; }
        if let Some(active) = patch.is_active { self.is_active = active; }
        self.touch();
        Ok(())
    }

    /// Soft delete; existing carts and orders keep referencing the record.
    pub fn deactivate(&mut self) { self.is_active = false; self.touch(); }

    fn set_name(&mut self, name: String) -> Result<(), ProductError> {
        let name = name.trim();
        if name.is_empty() { return Err(ProductError::MissingName); }
        if name.chars().count() > Self::NAME_MAX { return Err(ProductError::NameTooLong); }
        self.name = name.to_string();
        Ok(())
    }

    fn set_capacity(&mut self, capacity_kw: Decimal) -> Result<(), ProductError> {
        if capacity_kw < Decimal::new(1, 1) || capacity_kw > Decimal::new(1000, 0) {
            return Err(ProductError::CapacityOutOfRange(capacity_kw));
        }
        self.capacity_kw = capacity_kw;
        Ok(())
    }

    fn set_price(&mut self, price: Decimal) -> Result<(), ProductError> {
        if price.is_sign_negative() { return Err(ProductError::NegativePrice); }
        self.price = price;
        Ok(())
    }

    fn set_description(&mut self, description: Option<String>) -> Result<(), ProductError> {
        let description = description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        if description.as_ref().is_some_and(|d| d.chars().count() > Self::DESCRIPTION_MAX) {
            return Err(ProductError::DescriptionTooLong);
        }
        self.description = description;
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Document for Product {
    const COLLECTION: &'static str = "solar_panels";
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone)] pub enum ProductError { MissingName, NameTooLong, CapacityOutOfRange(Decimal), NegativePrice, DescriptionTooLong }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Panel name is required"),
            Self::NameTooLong => write!(f, "Panel name cannot exceed {} characters", Product::NAME_MAX),
            Self::CapacityOutOfRange(c) => write!(f, "Capacity must be between 0.1 and 1000 KW, got {c}"),
            Self::NegativePrice => write!(f, "Price must be a positive number"),
            Self::DescriptionTooLong => write!(f, "Description cannot exceed {} characters", Product::DESCRIPTION_MAX),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(name: &str, price: Decimal) -> Product {
    Product::create(NewProduct { name: name.into(), capacity_kw: Decimal::new(5, 0), price, description: None, suitable_for: SuitableFor::Home })
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_product_create() {
        let p = sample("  Mono 5kW ", Decimal::new(10000, 0));
        assert_eq!(p.name(), "Mono 5kW");
        assert!(p.is_active());
    }
    #[test]
    fn test_product_validation() {
        let new = NewProduct { name: "P".into(), capacity_kw: Decimal::new(5, 2), price: Decimal::ONE, description: None, suitable_for: SuitableFor::Commercial };
        assert!(matches!(Product::create(new), Err(ProductError::CapacityOutOfRange(_))));
        let mut p = sample("P", Decimal::ONE);
        assert!(matches!(p.apply(ProductPatch { price: Some(Decimal::NEGATIVE_ONE), ..Default::default() }), Err(ProductError::NegativePrice)));
        p.apply(ProductPatch { price: Some(Decimal::new(20000, 0)), ..Default::default() }).unwrap();
        assert_eq!(p.price(), Decimal::new(20000, 0));
        p.deactivate();
        assert!(!p.is_active());
    }
    #[test]
    fn test_description_trimmed_and_capped() {
        let mut p = sample("P", Decimal::ONE);
        p.apply(ProductPatch { description: Some("  Bifacial, 21% efficiency ".into()), ..Default::default() }).unwrap();
        assert_eq!(p.description(), Some("Bifacial, 21% efficiency"));
        let long = "x".repeat(Product::DESCRIPTION_MAX + 1);
        assert!(matches!(p.apply(ProductPatch { description: Some(long), ..Default::default() }), Err(ProductError::DescriptionTooLong)));
        p.apply(ProductPatch { description: Some("   ".into()), ..Default::default() }).unwrap();
        assert_eq!(p.description(), None);
    }
}

//! Solar panel catalog.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{NewProduct, Product, ProductPatch, SuitableFor};
use crate::services::not_found;
use crate::store::{Filter, Repository, Sort, Stores};
use crate::{CoreError, Result};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub name: Option<String>,
    pub suitable_for: Option<SuitableFor>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ProductQuery {
    fn matches(&self, product: &Product) -> bool {
        let name_ok = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).map_or(true, |needle| {
            product.name().to_lowercase().contains(&needle.to_lowercase())
        });
        name_ok
            && self.min_price.map_or(true, |min| product.price() >= min)
            && self.max_price.map_or(true, |max| product.price() <= max)
    }
}

#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn Repository<Product>>,
}

impl CatalogService {
    pub fn new(stores: Stores) -> Self { Self { products: stores.products } }

    /// Active panels, newest first.
    pub async fn list(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut filter = Filter::all().eq("is_active", true);
        if let Some(suitable_for) = query.suitable_for {
            filter = filter.eq("suitable_for", suitable_for);
        }
        let products = self.products.find(filter, Sort::NewestFirst).await?;
        Ok(products.into_iter().filter(|p| query.matches(p)).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Product> {
        self.products.find_by_id(id).await?.ok_or_else(|| not_found("Solar panel", id))
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create(&self, new: NewProduct) -> Result<Product> {
        let product = Product::create(new).map_err(|e| CoreError::Invalid(e.to_string()))?;
        let product = self.products.create(product).await?;
        info!(product_id = %product.id(), "solar panel created");
        Ok(product)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        let mut product = self.get(id).await?;
        product.apply(patch).map_err(|e| CoreError::Invalid(e.to_string()))?;
        let product = self.products.save(product).await?;
        info!(product_id = %id, price = %product.price(), "solar panel updated");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: Uuid) -> Result<Product> {
        let mut product = self.get(id).await?;
        product.deactivate();
        let product = self.products.save(product).await?;
        info!(product_id = %id, "solar panel deactivated");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn new_panel(name: &str, price: i64, suitable_for: SuitableFor) -> NewProduct {
        NewProduct { name: name.into(), capacity_kw: Decimal::new(5, 0), price: Decimal::new(price, 0), description: None, suitable_for }
    }

    #[tokio::test]
    async fn test_list_filters() {
        let catalog = CatalogService::new(Stores::in_memory());
        catalog.create(new_panel("Mono Home 5kW", 10000, SuitableFor::Home)).await.unwrap();
        let poly = catalog.create(new_panel("Poly Commercial 50kW", 90000, SuitableFor::Commercial)).await.unwrap();
        let retired = catalog.create(new_panel("Mono Legacy", 5000, SuitableFor::Home)).await.unwrap();
        catalog.deactivate(retired.id()).await.unwrap();

        let all = catalog.list(&ProductQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), poly.id()); // Newest first

        let home = catalog.list(&ProductQuery { suitable_for: Some(SuitableFor::Home), ..Default::default() }).await.unwrap();
        assert_eq!(home.len(), 1);

        let mono = catalog.list(&ProductQuery { name: Some("mono".into()), ..Default::default() }).await.unwrap();
        assert_eq!(mono.len(), 1);

        let cheap = catalog.list(&ProductQuery { max_price: Some(Decimal::new(20000, 0)), ..Default::default() }).await.unwrap();
        assert_eq!(cheap[0].name(), "Mono Home 5kW");
    }

    #[tokio::test]
    async fn test_update_and_missing() {
        let catalog = CatalogService::new(Stores::in_memory());
        let p = catalog.create(new_panel("Panel", 100, SuitableFor::Home)).await.unwrap();
        let err = catalog.update(p.id(), ProductPatch { name: Some("  ".into()), ..Default::default() }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(catalog.get(Uuid::new_v4()).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(catalog.deactivate(Uuid::new_v4()).await.unwrap_err().kind(), ErrorKind::NotFound);
    }
}

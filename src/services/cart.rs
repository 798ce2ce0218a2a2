//! Cart Service

use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartError};
use crate::domain::value_objects::Quantity;
use crate::services::not_found;
use crate::services::views::{single, CartView, Joiner};
use crate::store::{Filter, Sort, StoreError, Stores};
use crate::{CoreError, Result};

#[derive(Clone)]
pub struct CartService {
    stores: Stores,
}

impl CartService {
    pub fn new(stores: Stores) -> Self { Self { stores } }

    pub(crate) async fn find(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.stores.carts.find_one(Filter::all().eq("owner_id", user_id), Sort::NewestFirst).await?)
    }

    async fn require(&self, user_id: Uuid) -> Result<Cart> {
        self.find(user_id).await?.ok_or_else(|| CoreError::NotFound(format!("Cart not found for user {user_id}")))
    }

    async fn load_or_create(&self, user_id: Uuid) -> Result<Cart> {
        if let Some(cart) = self.find(user_id).await? {
            return Ok(cart);
        }
        match self.stores.carts.create(Cart::for_owner(user_id)).await {
            Ok(cart) => Ok(cart),
            Err(StoreError::Conflict { .. }) => {
                warn!(%user_id, "cart created concurrently, re-reading");
                self.require(user_id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Recomputes the total from current catalog prices.
    async fn reprice(&self, cart: &mut Cart) -> Result<()> {
        let mut prices = HashMap::new();
        for id in cart.product_ids() {
            if let Some(product) = self.stores.products.find_by_id(id).await? {
                prices.insert(id, product.price());
            }
        }
        cart.reprice(&prices).map_err(cart_error)
    }

    async fn view(&self, cart: Cart) -> Result<CartView> {
        single(Joiner::new(&self.stores).carts(vec![cart]).await?)
    }

    pub async fn get_or_create(&self, user_id: Uuid) -> Result<CartView> {
        let cart = self.load_or_create(user_id).await?;
        self.view(cart).await
    }

    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartView> {
        let quantity = Quantity::new(quantity).map_err(|e| CoreError::Invalid(e.to_string()))?;
        let product = self.stores.products.find_by_id(product_id).await?.ok_or_else(|| not_found("Solar panel", product_id))?;
        if !product.is_active() {
            return Err(CoreError::Invalid(format!("Solar panel {product_id} is no longer available")));
        }
        let mut cart = self.load_or_create(user_id).await?;
        cart.add_item(product_id, quantity).map_err(cart_error)?;
        self.reprice(&mut cart).await?;
        let cart = self.stores.carts.save(cart).await?;
        info!(cart_id = %cart.id(), total = %cart.total_amount(), "item added to cart");
        self.view(cart).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView> {
        let mut cart = self.require(user_id).await?;
        cart.remove_item(product_id).map_err(cart_error)?;
        self.reprice(&mut cart).await?;
        let cart = self.stores.carts.save(cart).await?;
        info!(cart_id = %cart.id(), total = %cart.total_amount(), "item removed from cart");
        self.view(cart).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<CartView> {
        let mut cart = self.require(user_id).await?;
        cart.clear();
        let cart = self.stores.carts.save(cart).await?;
        info!(cart_id = %cart.id(), "cart cleared");
        self.view(cart).await
    }
}

fn cart_error(err: CartError) -> CoreError {
    match err {
        CartError::ItemNotFound(_) => CoreError::NotFound(err.to_string()),
        CartError::UnknownProduct(_) | CartError::QuantityOverflow | CartError::TotalOverflow => CoreError::Invalid(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::aggregates::{product, ProductPatch};
    use crate::services::testing::Harness;
    use crate::ErrorKind;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_get_or_create_persists_once() {
        let h = Harness::new();
        let customer = h.customer().await;
        let first = h.services.carts.get_or_create(customer.id).await.unwrap();
        let second = h.services.carts.get_or_create(customer.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.items.is_empty());
        assert_eq!(first.total_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_add_item_merges_and_reprices() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(10000).await;
        h.services.carts.add_item(customer.id, panel.id(), 1).await.unwrap();
        let view = h.services.carts.add_item(customer.id, panel.id(), 2).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 3);
        assert_eq!(view.total_amount, Decimal::new(30000, 0));
        assert_eq!(view.items[0].product.as_ref().map(|p| p.price), Some(Decimal::new(10000, 0)));

        // Current prices are used on the next write
        h.services.catalog.update(panel.id(), ProductPatch { price: Some(Decimal::new(12000, 0)), ..Default::default() }).await.unwrap();
        let other = h.product(500).await;
        let view = h.services.carts.add_item(customer.id, other.id(), 1).await.unwrap();
        assert_eq!(view.total_amount, Decimal::new(36500, 0));
    }

    #[tokio::test]
    async fn test_add_item_rejections() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let carts = &h.services.carts;
        assert_eq!(carts.add_item(customer.id, panel.id(), 0).await.unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(carts.add_item(customer.id, Uuid::new_v4(), 1).await.unwrap_err().kind(), ErrorKind::NotFound);
        h.services.catalog.deactivate(panel.id()).await.unwrap();
        assert_eq!(carts.add_item(customer.id, panel.id(), 1).await.unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_unrepresentable_total_is_invalid() {
        let h = Harness::new();
        let customer = h.customer().await;
        let pricey = h.stores.products.create(product::sample("Utility 1GW", Decimal::from_i128_with_scale(50_000_000_000_000_000_000, 0))).await.unwrap();
        let err = h.services.carts.add_item(customer.id, pricey.id(), u32::MAX).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(h.services.carts.get_or_create(customer.id).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let h = Harness::new();
        let customer = h.customer().await;
        let carts = &h.services.carts;
        assert_eq!(carts.clear(customer.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(carts.remove_item(customer.id, Uuid::new_v4()).await.unwrap_err().kind(), ErrorKind::NotFound);

        let a = h.product(100).await;
        let b = h.product(250).await;
        carts.add_item(customer.id, a.id(), 1).await.unwrap();
        carts.add_item(customer.id, b.id(), 2).await.unwrap();
        let view = carts.remove_item(customer.id, a.id()).await.unwrap();
        assert_eq!(view.total_amount, Decimal::new(500, 0));
        assert_eq!(carts.remove_item(customer.id, a.id()).await.unwrap_err().kind(), ErrorKind::NotFound);

        let view = carts.clear(customer.id).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.total_amount, Decimal::ZERO);
        carts.clear(customer.id).await.unwrap(); // Idempotent
    }
}

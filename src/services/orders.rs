//! Order Service

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderError, OrderItem};
use crate::messaging::{publish_all, EventPublisher};
use crate::services::views::{single, Joiner, OrderView};
use crate::services::{not_found, Actor};
use crate::store::{Filter, Sort, Stores};
use crate::{CoreError, Result};

#[derive(Clone)]
pub struct OrderService {
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(stores: Stores, events: Arc<dyn EventPublisher>) -> Self { Self { stores, events } }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.stores.orders.find_by_id(order_id).await?.ok_or_else(|| not_found("Order", order_id))
    }

    async fn views(&self, orders: Vec<Order>) -> Result<Vec<OrderView>> {
        Joiner::new(&self.stores).orders(orders).await
    }

    /// Snapshots the caller's cart into a PENDING order at current prices,
    /// then empties the cart.
    #[instrument(skip(self))]
    pub async fn create_from_cart(&self, user_id: Uuid) -> Result<OrderView> {
        let mut cart = self
            .stores
            .carts
            .find_one(Filter::all().eq("owner_id", user_id), Sort::NewestFirst)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Cart not found for user {user_id}")))?;
        if cart.is_empty() {
            return Err(CoreError::Invalid("Cannot create an order from an empty cart".into()));
        }

        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = self.stores.products.find_by_id(line.product_id).await?;
            let product = match product {
                Some(p) if p.is_active() => p,
                _ => return Err(CoreError::Invalid(format!("Solar panel {} in cart is no longer available", line.product_id))),
            };
            items.push(OrderItem { product_id: line.product_id, quantity: line.quantity, price_at_purchase: product.price() });
        }

        let mut order = Order::place(user_id, items).map_err(order_error)?;
        let events = order.take_events();
        let order = self.stores.orders.create(order).await?;
        info!(order_id = %order.id(), total = %order.total_amount(), "order placed");
        publish_all(self.events.as_ref(), events).await;

        cart.clear();
        if let Err(e) = self.stores.carts.save(cart).await {
            warn!(order_id = %order.id(), error = %e, "order placed but cart could not be cleared");
        }

        single(self.views(vec![order]).await?)
    }

    /// Cancels a PENDING order. Only the owner or an admin may cancel.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn cancel(&self, order_id: Uuid, actor: &Actor) -> Result<OrderView> {
        let mut order = self.load(order_id).await?;
        if !order.is_owned_by(actor.id) && !actor.is_admin() {
            return Err(CoreError::Forbidden(format!("Not authorized to cancel order {order_id}")));
        }
        order.cancel(actor.id).map_err(order_error)?;
        let events = order.take_events();
        let order = self.stores.orders.save(order).await?;
        info!(%order_id, "order cancelled");
        publish_all(self.events.as_ref(), events).await;
        single(self.views(vec![order]).await?)
    }

    pub async fn by_id(&self, order_id: Uuid) -> Result<OrderView> {
        let order = self.load(order_id).await?;
        single(self.views(vec![order]).await?)
    }

    /// Like [`OrderService::by_id`] but only for the owner or an admin.
    pub async fn by_id_for(&self, order_id: Uuid, actor: &Actor) -> Result<OrderView> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(actor.id) && !actor.is_admin() {
            return Err(CoreError::Forbidden(format!("Not authorized to view order {order_id}")));
        }
        single(self.views(vec![order]).await?)
    }

    pub async fn by_user(&self, user_id: Uuid) -> Result<Vec<OrderView>> {
        let orders = self.stores.orders.find(Filter::all().eq("owner_id", user_id), Sort::NewestFirst).await?;
        self.views(orders).await
    }

    pub async fn all(&self) -> Result<Vec<OrderView>> {
        let orders = self.stores.orders.find(Filter::all(), Sort::NewestFirst).await?;
        self.views(orders).await
    }
}

pub(crate) fn order_error(err: OrderError) -> CoreError {
    CoreError::Invalid(err.to_string())
}

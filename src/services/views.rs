//! Read models returned by the services.
//!
//! References between aggregates are stored as ids; the views resolve them
//! into small summaries. A reference that no longer resolves is rendered as
//! `null` next to its id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Installation, InstallationStatus, Order, OrderStatus, Payment, PaymentStatus, Product, Review, Role, SuitableFor, User,
};
use crate::store::{Document, Stores};
use crate::Result;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self { Self { id: u.id, email: u.email.clone(), name: u.full_name(), role: u.role } }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub capacity_kw: Decimal,
    pub price: Decimal,
    pub description: Option<String>,
    pub suitable_for: SuitableFor,
    pub is_active: bool,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id(),
            name: p.name().to_string(),
            capacity_kw: p.capacity_kw(),
            price: p.price(),
            description: p.description().map(str::to_string),
            suitable_for: p.suitable_for(),
            is_active: p.is_active(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self { Self { id: o.id(), total_amount: o.total_amount(), status: o.status(), created_at: o.created_at() } }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub product: Option<ProductSummary>,
    pub quantity: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub items: Vec<CartLineView>,
    pub total_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub product: Option<ProductSummary>,
    pub quantity: u32,
    pub price_at_purchase: Decimal,
    /// `None` only if the line total is not representable.
    pub line_total: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer: Option<UserSummary>,
    pub items: Vec<OrderLineView>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order: Option<OrderSummary>,
    pub owner_id: Uuid,
    pub user: Option<UserSummary>,
    pub amount: Decimal,
    pub currency: String,
    pub external_intent_id: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstallationView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order: Option<OrderSummary>,
    pub customer_id: Uuid,
    pub customer: Option<UserSummary>,
    pub technician_id: Uuid,
    pub technician: Option<UserSummary>,
    pub status: InstallationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewView {
    pub id: Uuid,
    pub customer: Option<UserSummary>,
    pub order_id: Option<Uuid>,
    pub product: Option<ProductSummary>,
    pub verified_order_id: Option<Uuid>,
    pub technician: Option<UserSummary>,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Returned by a payment intent request; the secret lets the client finish
/// the payment with the gateway directly.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentCreated {
    pub payment_id: Uuid,
    pub client_secret: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Batched id lookups backing the views.
///
/// Ids are collected into owned sets before any lookup is awaited so the
/// returned futures stay `Send`.
pub(crate) struct Joiner<'a> {
    stores: &'a Stores,
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
}

impl<'a> Joiner<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores, users: HashMap::new(), products: HashMap::new(), orders: HashMap::new() }
    }

    pub async fn load_users(&mut self, ids: HashSet<Uuid>) -> Result<()> {
        for id in ids {
            if self.users.contains_key(&id) { continue; }
            if let Some(user) = self.stores.users.find_by_id(id).await? { self.users.insert(id, user); }
        }
        Ok(())
    }

    pub async fn load_products(&mut self, ids: HashSet<Uuid>) -> Result<()> {
        for id in ids {
            if self.products.contains_key(&id) { continue; }
            if let Some(product) = self.stores.products.find_by_id(id).await? { self.products.insert(id, product); }
        }
        Ok(())
    }

    pub async fn load_orders(&mut self, ids: HashSet<Uuid>) -> Result<()> {
        for id in ids {
            if self.orders.contains_key(&id) { continue; }
            if let Some(order) = self.stores.orders.find_by_id(id).await? { self.orders.insert(id, order); }
        }
        Ok(())
    }

    fn user(&self, id: Uuid) -> Option<UserSummary> { self.users.get(&id).map(UserSummary::from) }
    fn product(&self, id: Uuid) -> Option<ProductSummary> { self.products.get(&id).map(ProductSummary::from) }
    fn order(&self, id: Uuid) -> Option<OrderSummary> { self.orders.get(&id).map(OrderSummary::from) }

    pub async fn carts(mut self, carts: Vec<Cart>) -> Result<Vec<CartView>> {
        let product_ids = carts.iter().flat_map(Cart::product_ids).collect();
        self.load_products(product_ids).await?;
        Ok(carts
            .iter()
            .map(|c| CartView {
                id: c.id(),
                owner_id: c.owner_id(),
                items: c.items().iter().map(|i| CartLineView { product_id: i.product_id, product: self.product(i.product_id), quantity: i.quantity.value() }).collect(),
                total_amount: c.total_amount(),
                updated_at: Document::updated_at(c),
            })
            .collect())
    }

    pub async fn orders(mut self, orders: Vec<Order>) -> Result<Vec<OrderView>> {
        let owner_ids = orders.iter().map(Order::owner_id).collect();
        let product_ids = orders.iter().flat_map(|o| o.items().iter().map(|i| i.product_id)).collect();
        self.load_users(owner_ids).await?;
        self.load_products(product_ids).await?;
        Ok(orders
            .iter()
            .map(|o| OrderView {
                id: o.id(),
                customer_id: o.owner_id(),
                customer: self.user(o.owner_id()),
                items: o
                    .items()
                    .iter()
                    .map(|i| OrderLineView {
                        product_id: i.product_id,
                        product: self.product(i.product_id),
                        quantity: i.quantity.value(),
                        price_at_purchase: i.price_at_purchase,
                        line_total: i.line_total(),
                    })
                    .collect(),
                total_amount: o.total_amount(),
                status: o.status(),
                created_at: o.created_at(),
                updated_at: Document::updated_at(o),
            })
            .collect())
    }

    pub async fn payments(mut self, payments: Vec<Payment>) -> Result<Vec<PaymentView>> {
        let owner_ids = payments.iter().map(Payment::owner_id).collect();
        let order_ids = payments.iter().map(Payment::order_id).collect();
        self.load_users(owner_ids).await?;
        self.load_orders(order_ids).await?;
        Ok(payments
            .iter()
            .map(|p| PaymentView {
                id: p.id(),
                order_id: p.order_id(),
                order: self.order(p.order_id()),
                owner_id: p.owner_id(),
                user: self.user(p.owner_id()),
                amount: p.amount(),
                currency: p.currency().to_string(),
                external_intent_id: p.external_intent_id().to_string(),
                status: p.status(),
                created_at: Document::created_at(p),
                updated_at: Document::updated_at(p),
            })
            .collect())
    }

    pub async fn installations(mut self, installations: Vec<Installation>) -> Result<Vec<InstallationView>> {
        let user_ids = installations.iter().flat_map(|i| [i.customer_id(), i.technician_id()]).collect();
        let order_ids = installations.iter().map(Installation::order_id).collect();
        self.load_users(user_ids).await?;
        self.load_orders(order_ids).await?;
        Ok(installations
            .iter()
            .map(|i| InstallationView {
                id: i.id(),
                order_id: i.order_id(),
                order: self.order(i.order_id()),
                customer_id: i.customer_id(),
                customer: self.user(i.customer_id()),
                technician_id: i.technician_id(),
                technician: self.user(i.technician_id()),
                status: i.status(),
                notes: i.notes().map(str::to_string),
                created_at: Document::created_at(i),
                updated_at: Document::updated_at(i),
            })
            .collect())
    }

    pub async fn reviews(mut self, reviews: Vec<Review>) -> Result<Vec<ReviewView>> {
        let user_ids = reviews.iter().flat_map(|r| std::iter::once(r.customer_id()).chain(r.technician_id())).collect();
        let product_ids = reviews.iter().filter_map(Review::product_id).collect();
        self.load_users(user_ids).await?;
        self.load_products(product_ids).await?;
        Ok(reviews
            .iter()
            .map(|r| ReviewView {
                id: r.id(),
                customer: self.user(r.customer_id()),
                order_id: r.order_id(),
                product: r.product_id().and_then(|id| self.product(id)),
                verified_order_id: r.verified_order_id(),
                technician: r.technician_id().and_then(|id| self.user(id)),
                rating: r.rating().value(),
                comment: r.comment().map(str::to_string),
                created_at: Document::created_at(r),
            })
            .collect())
    }
}

/// Takes the single element of a one-element view batch.
pub(crate) fn single<T>(mut views: Vec<T>) -> Result<T> {
    views.pop().ok_or_else(|| crate::CoreError::NotFound("Record disappeared while loading".to_string()))
}

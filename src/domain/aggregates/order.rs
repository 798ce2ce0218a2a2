//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Lifecycle, Quantity};
use crate::store::Document;

/// Snapshot of a cart at checkout. Items and their prices never change after
/// creation; only `status` moves, along [`OrderStatus::TRANSITIONS`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    owner_id: Uuid,
    items: Vec<OrderItem>,
    total_amount: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem { pub product_id: Uuid, pub quantity: Quantity, pub price_at_purchase: Decimal }

impl OrderItem {
    pub fn line_total(&self) -> Option<Decimal> { self.quantity.times(self.price_at_purchase) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Paid, Cancelled }

impl Lifecycle for OrderStatus {
    const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
        (Self::Pending, &[Self::Paid, Self::Cancelled]),
        (Self::Paid, &[]),
        (Self::Cancelled, &[]),
    ];
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Pending => "PENDING", Self::Paid => "PAID", Self::Cancelled => "CANCELLED" })
    }
}

impl Order {
    /// Creates a PENDING order; the total is the sum of the frozen line totals.
    pub fn place(owner_id: Uuid, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let total_amount = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| item.line_total().and_then(|line| total.checked_add(line)))
            .ok_or(OrderError::TotalOverflow)?;
        let mut order = Self {
            id: Uuid::now_v7(), owner_id, items, total_amount, status: OrderStatus::Pending,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: order.id, customer_id: owner_id, total_amount }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner_id(&self) -> Uuid { self.owner_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn total_amount(&self) -> Decimal { self.total_amount }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.owner_id == user_id }

    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Paid)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn cancel(&mut self, cancelled_by: Uuid) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id, cancelled_by }));
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_become(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, TotalOverflow, InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order must contain at least one item"),
            Self::TotalOverflow => write!(f, "Order total is too large"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}. Allowed: {}", from.describe_next()),
        }
    }
}

#[cfg(test)]
pub(crate) fn item(product_id: Uuid, quantity: u32, price: Decimal) -> OrderItem {
    OrderItem { product_id, quantity: Quantity::new(quantity).unwrap(), price_at_purchase: price }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_order_workflow() {
        let mut order = Order::place(Uuid::new_v4(), vec![item(Uuid::new_v4(), 2, Decimal::new(10000, 0)), item(Uuid::new_v4(), 1, Decimal::new(550, 1))]).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Decimal::new(200550, 1));
        order.mark_paid().unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert!(order.cancel(Uuid::new_v4()).is_err());
        let events = order.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].subject(), "order.paid");
    }
    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(Order::place(Uuid::new_v4(), vec![]).unwrap_err(), OrderError::NoItems);
    }
    #[test]
    fn test_total_overflow_rejected() {
        let items = vec![item(Uuid::new_v4(), 1, Decimal::MAX), item(Uuid::new_v4(), 1, Decimal::ONE)];
        assert_eq!(Order::place(Uuid::new_v4(), items).unwrap_err(), OrderError::TotalOverflow);
        let items = vec![item(Uuid::new_v4(), u32::MAX, Decimal::from_i128_with_scale(50_000_000_000_000_000_000, 0))];
        assert_eq!(Order::place(Uuid::new_v4(), items).unwrap_err(), OrderError::TotalOverflow);
    }
    #[test]
    fn test_every_transition_pair() {
        for from in OrderStatus::states() {
            for to in OrderStatus::states() {
                let legal = matches!((from, to), (OrderStatus::Pending, OrderStatus::Paid) | (OrderStatus::Pending, OrderStatus::Cancelled));
                assert_eq!(from.can_become(to), legal, "{from} -> {to}");
            }
        }
        assert!(OrderStatus::Paid.is_terminal() && OrderStatus::Cancelled.is_terminal());
    }
    #[test]
    fn test_events_not_persisted() {
        let order = Order::place(Uuid::new_v4(), vec![item(Uuid::new_v4(), 1, Decimal::ONE)]).unwrap();
        let doc = serde_json::to_value(&order).unwrap();
        assert!(doc.get("events").is_none());
        assert_eq!(doc["status"], "PENDING");
    }
}

//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::InstallationStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
    Installation(InstallationEvent),
    Review(ReviewEvent),
}

impl DomainEvent {
    /// Dotted routing key such as `order.placed`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Order(e) => ("order", e.name()),
            Self::Payment(e) => ("payment", e.name()),
            Self::Installation(e) => ("installation", e.name()),
            Self::Review(e) => ("review", e.name()),
        };
        format!("{aggregate}.{name}")
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, customer_id: Uuid, total_amount: Decimal },
    Paid { order_id: Uuid },
    Cancelled { order_id: Uuid, cancelled_by: Uuid },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self { Self::Placed { .. } => "placed", Self::Paid { .. } => "paid", Self::Cancelled { .. } => "cancelled" }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    IntentCreated { payment_id: Uuid, order_id: Uuid, amount: Decimal, currency: String },
    Succeeded { payment_id: Uuid, order_id: Uuid },
    Failed { payment_id: Uuid, order_id: Uuid, reason: String },
}

impl PaymentEvent {
    fn name(&self) -> &'static str {
        match self { Self::IntentCreated { .. } => "intent_created", Self::Succeeded { .. } => "succeeded", Self::Failed { .. } => "failed" }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallationEvent {
    Assigned { installation_id: Uuid, order_id: Uuid, technician_id: Uuid },
    StatusChanged { installation_id: Uuid, from: InstallationStatus, to: InstallationStatus },
}

impl InstallationEvent {
    fn name(&self) -> &'static str {
        match self { Self::Assigned { .. } => "assigned", Self::StatusChanged { .. } => "status_changed" }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    Submitted { review_id: Uuid, customer_id: Uuid, order_id: Option<Uuid>, product_id: Option<Uuid>, rating: u8 },
}

impl ReviewEvent {
    fn name(&self) -> &'static str {
        match self { Self::Submitted { .. } => "submitted" }
    }
}

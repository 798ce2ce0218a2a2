//! Payment Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::Lifecycle;
use crate::store::{Document, UniqueKey};

/// Local record of one gateway payment intent for one order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    id: Uuid,
    owner_id: Uuid,
    order_id: Uuid,
    amount: Decimal,
    currency: String,
    external_intent_id: String,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Created, Success, Failed }

impl PaymentStatus {
    /// CREATED and SUCCESS block a new payment for the same order.
    pub fn is_active(self) -> bool { matches!(self, Self::Created | Self::Success) }
}

impl Lifecycle for PaymentStatus {
    const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
        (Self::Created, &[Self::Success, Self::Failed]),
        (Self::Success, &[]),
        (Self::Failed, &[]),
    ];
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Created => "CREATED", Self::Success => "SUCCESS", Self::Failed => "FAILED" })
    }
}

impl Payment {
    pub fn open(owner_id: Uuid, order_id: Uuid, amount: Decimal, currency: impl Into<String>, external_intent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let currency = currency.into().to_uppercase();
        let mut payment = Self {
            id: Uuid::now_v7(), owner_id, order_id, amount, currency: currency.clone(), external_intent_id: external_intent_id.into(),
            status: PaymentStatus::Created, created_at: now, updated_at: now, events: vec![],
        };
        payment.raise_event(DomainEvent::Payment(PaymentEvent::IntentCreated { payment_id: payment.id, order_id, amount, currency }));
        payment
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner_id(&self) -> Uuid { self.owner_id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn external_intent_id(&self) -> &str { &self.external_intent_id }
    pub fn status(&self) -> PaymentStatus { self.status }

    pub fn mark_succeeded(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentStatus::Success)?;
        self.raise_event(DomainEvent::Payment(PaymentEvent::Succeeded { payment_id: self.id, order_id: self.order_id }));
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), PaymentError> {
        self.transition(PaymentStatus::Failed)?;
        self.raise_event(DomainEvent::Payment(PaymentEvent::Failed { payment_id: self.id, order_id: self.order_id, reason: reason.into() }));
        Ok(())
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), PaymentError> {
        if !self.status.can_become(next) {
            return Err(PaymentError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Document for Payment {
    const COLLECTION: &'static str = "payments";
    const UNIQUE_KEYS: &'static [UniqueKey] = &[
        UniqueKey::on("external_intent", &["external_intent_id"]),
        UniqueKey::on("active_order", &["order_id"]).when("status", &["CREATED", "SUCCESS"]),
    ];
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PaymentError { InvalidTransition { from: PaymentStatus, to: PaymentStatus } }
impl std::error::Error for PaymentError {}
impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::InvalidTransition { from, to } => write!(f, "Cannot move payment from {from} to {to}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_payment_terminal_states() {
        let mut p = Payment::open(Uuid::new_v4(), Uuid::new_v4(), Decimal::new(15000, 0), "inr", "pi_1");
        assert_eq!(p.currency(), "INR");
        assert!(p.status().is_active());
        p.mark_failed("canceled").unwrap();
        assert!(!p.status().is_active());
        assert!(p.mark_succeeded().is_err());
        assert!(PaymentStatus::Success.is_terminal());
    }
}

//! Installation Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::Order;
use crate::domain::events::{DomainEvent, InstallationEvent};
use crate::domain::value_objects::Lifecycle;
use crate::store::{Document, UniqueKey};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Installation {
    id: Uuid,
    order_id: Uuid,
    customer_id: Uuid,
    technician_id: Uuid,
    status: InstallationStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallationStatus { #[default] Pending, InProgress, Completed }

impl Lifecycle for InstallationStatus {
    const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
        (Self::Pending, &[Self::InProgress]),
        (Self::InProgress, &[Self::Completed]),
        (Self::Completed, &[]),
    ];
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Pending => "PENDING", Self::InProgress => "IN_PROGRESS", Self::Completed => "COMPLETED" })
    }
}

impl FromStr for InstallationStatus {
    type Err = InstallationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(InstallationError::UnknownStatus(other.to_string())),
        }
    }
}

impl Installation {
    pub const NOTES_MAX: usize = 500;

    /// Opens a PENDING installation for the order's owner. The caller checks
    /// that the order is PAID and the technician holds the TECHNICIAN role.
    pub fn assign(order: &Order, technician_id: Uuid) -> Self {
        let now = Utc::now();
        let mut installation = Self {
            id: Uuid::now_v7(), order_id: order.id(), customer_id: order.owner_id(), technician_id,
            status: InstallationStatus::Pending, notes: None, created_at: now, updated_at: now, events: vec![],
        };
        installation.raise_event(DomainEvent::Installation(InstallationEvent::Assigned {
            installation_id: installation.id, order_id: installation.order_id, technician_id,
        }));
        installation
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn technician_id(&self) -> Uuid { self.technician_id }
    pub fn status(&self) -> InstallationStatus { self.status }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn is_assigned_to(&self, user_id: Uuid) -> bool { self.technician_id == user_id }

    /// Moves to `next`. Blank notes leave the stored notes alone.
    pub fn advance(&mut self, next: InstallationStatus, notes: Option<String>) -> Result<(), InstallationError> {
        let from = self.status;
        if !from.can_become(next) {
            return Err(InstallationError::InvalidTransition { from, to: next });
        }
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if notes.as_ref().is_some_and(|n| n.chars().count() > Self::NOTES_MAX) {
            return Err(InstallationError::NotesTooLong);
        }
        if notes.is_some() { self.notes = notes; }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Installation(InstallationEvent::StatusChanged { installation_id: self.id, from, to: next }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl Document for Installation {
    const COLLECTION: &'static str = "installations";
    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey::on("order", &["order_id"])];
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationError { InvalidTransition { from: InstallationStatus, to: InstallationStatus }, NotesTooLong, UnknownStatus(String) }
impl std::error::Error for InstallationError {}
impl std::fmt::Display for InstallationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => write!(f, "Invalid status transition from {from} to {to}. Allowed: {}", from.describe_next()),
            Self::NotesTooLong => write!(f, "Notes cannot exceed {} characters", Installation::NOTES_MAX),
            Self::UnknownStatus(s) => write!(f, "Unknown installation status: {s}"),
        }
    }
}

//! Solar Commerce
//!
//! Purchase lifecycle for residential and commercial solar installations.
//!
//! ## Features
//! - Solar panel catalog with soft delete
//! - One cart per customer, re-priced on every change
//! - Orders snapshotting cart contents at checkout
//! - Payment intents reconciled against the payment gateway
//! - Technician installations with a fixed status workflow
//! - Order and verified-purchase product reviews

pub mod config;
pub mod domain;
pub mod gateway;
pub mod http;
pub mod messaging;
pub mod services;
pub mod store;

#[cfg(test)]
mod scenarios;

use serde::Serialize;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

/// Machine-checkable failure category, stable across messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Forbidden,
    Conflict,
    UpstreamFailure,
    Internal,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Payment gateway failure: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Upstream(_) => ErrorKind::UpstreamFailure,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => CoreError::Conflict(err.to_string()),
            other => CoreError::Storage(other),
        }
    }
}

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        CoreError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Payment gateway client.
//!
//! The services only need two calls: create an intent for an amount in minor
//! units, and look an intent up again by its opaque id.

mod sandbox;
mod stripe;

pub use sandbox::SandboxGateway;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment intent {0} not found")]
    UnknownIntent(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateIntent {
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Succeeded,
    Canceled,
    RequiresCapture,
    Other(String),
}

impl IntentStatus {
    /// The customer can still complete this intent with its client secret.
    pub fn is_awaiting_customer(&self) -> bool {
        matches!(self, Self::RequiresPaymentMethod | Self::RequiresConfirmation | Self::RequiresAction)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::RequiresCapture => "requires_capture",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            "requires_capture" => Self::RequiresCapture,
            _ => Self::Other(s),
        }
    }
}

impl From<IntentStatus> for String {
    fn from(s: IntentStatus) -> String { s.as_str().to_string() }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent, GatewayError>;

    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_intent_status_parse() {
        let intent: GatewayIntent = serde_json::from_str(r#"{"id":"pi_1","client_secret":"s","status":"requires_action","amount":5}"#).unwrap();
        assert!(intent.status.is_awaiting_customer());
        let other: IntentStatus = "processing".to_string().into();
        assert_eq!(other, IntentStatus::Other("processing".into()));
        assert_eq!(other.to_string(), "processing");
        assert!(!IntentStatus::RequiresCapture.is_awaiting_customer());
    }
}

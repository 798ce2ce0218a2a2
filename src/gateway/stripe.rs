//! Stripe PaymentIntents over the REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::{CreateIntent, GatewayError, GatewayIntent, PaymentGateway};

pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope { error: ErrorBody }

#[derive(Deserialize)]
struct ErrorBody { message: Option<String> }

impl StripeGateway {
    pub fn new(base_url: &str, secret_key: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), secret_key: secret_key.into() })
    }

    fn form(request: &CreateIntent) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("description".to_string(), request.description.clone()),
        ];
        form.extend(request.metadata.iter().map(|(k, v)| (format!("metadata[{k}]"), v.clone())));
        form
    }

    async fn read(response: reqwest::Response, id: Option<&str>) -> Result<GatewayIntent, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<GatewayIntent>().await?);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id { return Err(GatewayError::UnknownIntent(id.to_string())); }
        }
        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| status.to_string());
        Err(GatewayError::Rejected { status: status.as_u16(), message })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount_minor, currency = %request.currency))]
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&Self::form(&request))
            .send()
            .await?;
        Self::read(response, None).await
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{id}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::read(response, Some(id)).await
    }
}

//! Runtime configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (default 8083)
    pub port: u16,
    /// PostgreSQL URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Stripe secret key; the sandbox gateway is used when absent
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub gateway_timeout: Duration,
    /// ISO currency code every intent is created in
    pub payment_currency: String,
    /// NATS server; events are only logged when absent
    pub nats_url: Option<String>,
    pub event_subject_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            port: get("PORT").unwrap_or_else(|| "8083".to_string()).parse().context("Failed to parse PORT as a number")?,
            database_url: get("DATABASE_URL"),
            db_max_connections: get("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Failed to parse DB_MAX_CONNECTIONS as a number")?,
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".to_string()),
            gateway_timeout: Duration::from_secs(
                get("GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|| "15".to_string())
                    .parse()
                    .context("Failed to parse GATEWAY_TIMEOUT_SECS as a number")?,
            ),
            payment_currency: get("PAYMENT_CURRENCY").unwrap_or_else(|| "INR".to_string()).to_uppercase(),
            nats_url: get("NATS_URL"),
            event_subject_prefix: get("EVENT_SUBJECT_PREFIX").unwrap_or_else(|| "solar".to_string()),
        })
    }
}

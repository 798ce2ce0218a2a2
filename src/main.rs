//! Solar Commerce - solar panel sales, payments and installations

use anyhow::{Context, Result};
use solar_commerce::config::Config;
use solar_commerce::gateway::{PaymentGateway, SandboxGateway, StripeGateway};
use solar_commerce::http;
use solar_commerce::messaging::{EventPublisher, NatsPublisher, TracingPublisher};
use solar_commerce::services::Services;
use solar_commerce::store::Stores;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.db_max_connections).connect(url).await.context("Failed to connect to PostgreSQL")?;
            Stores::postgres(db).await.context("Failed to prepare document tables")?
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Stores::in_memory()
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(&config.stripe_api_base, key.clone(), config.gateway_timeout).context("Failed to build Stripe client")?),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, payments go to the sandbox gateway");
            Arc::new(SandboxGateway::new())
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client, config.event_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                Arc::new(TracingPublisher)
            }
        },
        None => Arc::new(TracingPublisher),
    };

    let services = Services::new(stores, gateway, events, config.payment_currency.clone());
    let app = http::router(services);

    tracing::info!("🚀 Solar Commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

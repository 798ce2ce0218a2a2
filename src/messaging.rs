//! Domain event publishing.
//!
//! Events are published after the write that raised them has committed.
//! Publishing is best-effort: a failure is logged and never undoes the write.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker publish failed: {0}")]
    Broker(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Publishes each event as JSON on `{prefix}.{aggregate}.{event}`.
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    fn subject_for(&self, event: &DomainEvent) -> String { format!("{}.{}", self.prefix, event.subject()) }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject_for(event), payload.into())
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))
    }
}

/// Writes events to the log when no broker is configured.
#[derive(Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        info!(subject = %event.subject(), %payload, "domain event");
        Ok(())
    }
}

pub async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            warn!(subject = %event.subject(), error = %e, "failed to publish domain event");
        }
    }
}

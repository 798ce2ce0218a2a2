//! Installation Service

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Installation, InstallationError, InstallationStatus, OrderStatus, Role};
use crate::messaging::{publish_all, EventPublisher};
use crate::services::not_found;
use crate::services::views::{single, InstallationView, Joiner};
use crate::store::{Filter, Sort, StoreError, Stores};
use crate::{CoreError, Result};

#[derive(Clone)]
pub struct InstallationService {
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl InstallationService {
    pub fn new(stores: Stores, events: Arc<dyn EventPublisher>) -> Self { Self { stores, events } }

    async fn views(&self, installations: Vec<Installation>) -> Result<Vec<InstallationView>> {
        Joiner::new(&self.stores).installations(installations).await
    }

    /// Assigns a technician to a PAID order, opening its single installation.
    #[instrument(skip(self))]
    pub async fn assign(&self, order_id: Uuid, technician_id: Uuid) -> Result<InstallationView> {
        let order = self.stores.orders.find_by_id(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
        if order.status() != OrderStatus::Paid {
            return Err(CoreError::Invalid(format!(
                "Cannot create installation for order {order_id} with status {}. Order must be PAID",
                order.status()
            )));
        }
        if self.stores.installations.find_one(Filter::all().eq("order_id", order_id), Sort::NewestFirst).await?.is_some() {
            return Err(CoreError::Invalid(format!("Installation already assigned for order {order_id}")));
        }
        let technician = self.stores.users.find_by_id(technician_id).await?.ok_or_else(|| not_found("Technician", technician_id))?;
        if technician.role != Role::Technician {
            return Err(CoreError::Invalid(format!("User {technician_id} is {}, not a TECHNICIAN", technician.role)));
        }

        let mut installation = Installation::assign(&order, technician_id);
        let events = installation.take_events();
        let installation = self.stores.installations.create(installation).await.map_err(|e| match e {
            StoreError::Conflict { .. } => CoreError::Conflict(format!("Installation already assigned for order {order_id}")),
            other => other.into(),
        })?;
        info!(installation_id = %installation.id(), %technician_id, "technician assigned");
        publish_all(self.events.as_ref(), events).await;
        single(self.views(vec![installation]).await?)
    }

    /// Advances the installation one step. Only its technician may do this.
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        installation_id: Uuid,
        status: InstallationStatus,
        notes: Option<String>,
        technician_id: Uuid,
    ) -> Result<InstallationView> {
        let mut installation = self
            .stores
            .installations
            .find_by_id(installation_id)
            .await?
            .ok_or_else(|| not_found("Installation", installation_id))?;
        if !installation.is_assigned_to(technician_id) {
            return Err(CoreError::Forbidden(format!("Installation {installation_id} is not assigned to technician {technician_id}")));
        }
        let from = installation.status();
        installation.advance(status, notes).map_err(installation_error)?;
        let events = installation.take_events();
        let installation = self.stores.installations.save(installation).await?;
        info!(%installation_id, %from, to = %status, "installation status updated");
        publish_all(self.events.as_ref(), events).await;
        single(self.views(vec![installation]).await?)
    }

    pub async fn by_id(&self, installation_id: Uuid) -> Result<InstallationView> {
        let installation = self.stores.installations.find_by_id(installation_id).await?.ok_or_else(|| not_found("Installation", installation_id))?;
        single(self.views(vec![installation]).await?)
    }

    pub async fn list_for_technician(&self, technician_id: Uuid) -> Result<Vec<InstallationView>> {
        let found = self.stores.installations.find(Filter::all().eq("technician_id", technician_id), Sort::NewestFirst).await?;
        self.views(found).await
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<InstallationView>> {
        let found = self.stores.installations.find(Filter::all().eq("customer_id", customer_id), Sort::NewestFirst).await?;
        self.views(found).await
    }

    pub async fn list_all(&self) -> Result<Vec<InstallationView>> {
        let found = self.stores.installations.find(Filter::all(), Sort::NewestFirst).await?;
        self.views(found).await
    }
}

fn installation_error(err: InstallationError) -> CoreError {
    CoreError::Invalid(err.to_string())
}

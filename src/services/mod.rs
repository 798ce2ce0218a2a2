//! Application services.
//!
//! One service per aggregate. Each operation loads the documents it needs,
//! applies the aggregate's rules, writes the result back whole and publishes
//! the raised events once the write has succeeded.

pub mod cart;
pub mod catalog;
pub mod installations;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod users;
pub mod views;

pub use cart::CartService;
pub use catalog::{CatalogService, ProductQuery};
pub use installations::InstallationService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use reviews::ReviewService;
pub use users::UserService;

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::Role;
use crate::gateway::PaymentGateway;
use crate::messaging::EventPublisher;
use crate::store::Stores;
use crate::CoreError;

/// The authenticated caller of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self { Self { id, role } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub users: UserService,
    pub carts: CartService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub installations: InstallationService,
    pub reviews: ReviewService,
}

impl Services {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>, currency: impl Into<String>) -> Self {
        Self {
            catalog: CatalogService::new(stores.clone()),
            users: UserService::new(stores.clone()),
            carts: CartService::new(stores.clone()),
            orders: OrderService::new(stores.clone(), events.clone()),
            payments: PaymentService::new(stores.clone(), gateway, events.clone(), currency),
            installations: InstallationService::new(stores.clone(), events.clone()),
            reviews: ReviewService::new(stores, events),
        }
    }
}

pub(crate) fn not_found(what: &str, id: Uuid) -> CoreError {
    CoreError::NotFound(format!("{what} {id} not found"))
}

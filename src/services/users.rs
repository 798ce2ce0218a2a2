//! User directory.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{NewUser, Role, User};
use crate::services::not_found;
use crate::store::{Filter, Repository, Sort, StoreError, Stores};
use crate::{CoreError, Result};

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn Repository<User>>,
}

impl UserService {
    pub fn new(stores: Stores) -> Self { Self { users: stores.users } }

    #[instrument(skip(self, new), fields(role = %new.role))]
    pub async fn register(&self, new: NewUser) -> Result<User> {
        let user = User::register(new);
        if user.email.is_empty() {
            return Err(CoreError::Invalid("Email is required".into()));
        }
        let email = user.email.clone();
        let user = self.users.create(user).await.map_err(|e| match e {
            StoreError::Conflict { .. } => CoreError::Conflict(format!("Email {email} is already registered")),
            other => other.into(),
        })?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.users.find_by_id(id).await?.ok_or_else(|| not_found("User", id))
    }

    pub async fn list_by_role(&self, role: Role) -> Result<Vec<User>> {
        Ok(self.users.find(Filter::all().eq("role", role).eq("is_active", true), Sort::NewestFirst).await?)
    }
}

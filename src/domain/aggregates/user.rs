//! User profiles. Credentials live with the auth service, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::store::{Document, UniqueKey};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    #[default]
    Customer,
    Technician,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self { Self::Admin => "ADMIN", Self::Customer => "CUSTOMER", Self::Technician => "TECHNICIAN" };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "CUSTOMER" => Ok(Self::Customer),
            "TECHNICIAN" => Ok(Self::Technician),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser { pub email: String, pub first_name: Option<String>, pub last_name: Option<String>, pub phone_number: Option<String>, #[serde(default)] pub role: Role }

impl User {
    pub fn register(new: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), email: new.email.trim().to_lowercase(), first_name: new.first_name, last_name: new.last_name,
            phone_number: new.phone_number, role: new.role, is_active: true, created_at: now, updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE_KEYS: &'static [UniqueKey] = &[UniqueKey::on("email", &["email"])];
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[cfg(test)]
pub(crate) fn sample(role: Role) -> User {
    User::register(NewUser { email: format!("{}@example.com", Uuid::new_v4()), first_name: Some("Asha".into()), last_name: Some("Rao".into()), phone_number: None, role })
}

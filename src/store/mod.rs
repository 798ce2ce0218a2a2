//! Document persistence.
//!
//! Every aggregate is stored as one JSON document per record. A [`Repository`]
//! offers the small capability set the services rely on: find by id, find by
//! containment filter with ordering, create, whole-document save and delete.
//! Uniqueness rules are declared per document type through
//! [`Document::UNIQUE_KEYS`] and enforced by the adapter, which reports a
//! violation as [`StoreError::Conflict`].

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Installation, Order, Payment, Product, Review, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} document violates unique key {key}")]
    Conflict { collection: &'static str, key: String },

    #[error("{collection} document {id} does not exist")]
    Missing { collection: &'static str, id: Uuid },

    #[error("Document codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted aggregate.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (table) name. Must be a plain SQL identifier.
    const COLLECTION: &'static str;
    const UNIQUE_KEYS: &'static [UniqueKey] = &[];

    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Unique index over one or more top-level document fields.
///
/// The index only covers documents where every field is present and not
/// null, and, when `only_when` is set, where the named field holds one of the
/// listed string values.
#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub only_when: Option<(&'static str, &'static [&'static str])>,
}

impl UniqueKey {
    pub const fn on(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields, only_when: None }
    }

    pub const fn when(self, field: &'static str, values: &'static [&'static str]) -> Self {
        Self { only_when: Some((field, values)), ..self }
    }

    /// The indexed tuple of a serialized document, `None` when the index does
    /// not cover it.
    pub fn key_of(&self, doc: &Value) -> Option<Vec<Value>> {
        if let Some((field, values)) = self.only_when {
            let current = doc.get(field).and_then(Value::as_str)?;
            if !values.contains(&current) { return None; }
        }
        self.fields
            .iter()
            .map(|f| doc.get(*f).filter(|v| !v.is_null()).cloned())
            .collect()
    }
}

/// JSON containment filter, with the semantics of PostgreSQL's `@>`.
///
/// Scalars match by equality, objects match when every filter key matches,
/// arrays match when every filter element is contained in some document
/// element.
#[derive(Clone, Debug, Default)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn all() -> Self { Self::default() }

    pub fn eq(mut self, field: &str, value: impl Serialize) -> Self {
        self.0.insert(field.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    /// Matches documents whose array `field` has an element containing `element`.
    pub fn has_element(mut self, field: &str, element: Value) -> Self {
        self.0.insert(field.to_string(), Value::Array(vec![element]));
        self
    }

    pub fn to_value(&self) -> Value { Value::Object(self.0.clone()) }

    pub fn matches(&self, doc: &Value) -> bool {
        self.0.iter().all(|(k, expected)| doc.get(k).is_some_and(|actual| contains(actual, expected)))
    }
}

fn contains(doc: &Value, pattern: &Value) -> bool {
    match (doc, pattern) {
        (Value::Object(d), Value::Object(p)) => {
            p.iter().all(|(k, pv)| d.get(k).is_some_and(|dv| contains(dv, pv)))
        }
        (Value::Array(d), Value::Array(p)) => p.iter().all(|pv| d.iter().any(|dv| contains(dv, pv))),
        (Value::Array(d), p) if !p.is_object() => d.iter().any(|dv| dv == p),
        (d, p) => d == p,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[async_trait]
pub trait Repository<T: Document>: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<T>>;

    async fn find(&self, filter: Filter, sort: Sort) -> StoreResult<Vec<T>>;

    async fn find_one(&self, filter: Filter, sort: Sort) -> StoreResult<Option<T>> {
        Ok(self.find(filter, sort).await?.into_iter().next())
    }

    /// Inserts a new document. Fails with `Conflict` on a duplicate id or key.
    async fn create(&self, doc: T) -> StoreResult<T>;

    /// Replaces the stored document with the same id.
    async fn save(&self, doc: T) -> StoreResult<T>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// One repository per aggregate.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn Repository<Product>>,
    pub users: Arc<dyn Repository<User>>,
    pub carts: Arc<dyn Repository<Cart>>,
    pub orders: Arc<dyn Repository<Order>>,
    pub payments: Arc<dyn Repository<Payment>>,
    pub installations: Arc<dyn Repository<Installation>>,
    pub reviews: Arc<dyn Repository<Review>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(MemoryRepository::new()),
            users: Arc::new(MemoryRepository::new()),
            carts: Arc::new(MemoryRepository::new()),
            orders: Arc::new(MemoryRepository::new()),
            payments: Arc::new(MemoryRepository::new()),
            installations: Arc::new(MemoryRepository::new()),
            reviews: Arc::new(MemoryRepository::new()),
        }
    }

    /// Builds PostgreSQL repositories, creating tables and indexes if needed.
    pub async fn postgres(pool: PgPool) -> StoreResult<Self> {
        Ok(Self {
            products: Arc::new(PgRepository::<Product>::connect(pool.clone()).await?),
            users: Arc::new(PgRepository::<User>::connect(pool.clone()).await?),
            carts: Arc::new(PgRepository::<Cart>::connect(pool.clone()).await?),
            orders: Arc::new(PgRepository::<Order>::connect(pool.clone()).await?),
            payments: Arc::new(PgRepository::<Payment>::connect(pool.clone()).await?),
            installations: Arc::new(PgRepository::<Installation>::connect(pool.clone()).await?),
            reviews: Arc::new(PgRepository::<Review>::connect(pool).await?),
        })
    }
}

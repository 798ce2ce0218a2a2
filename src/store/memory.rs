//! In-process document store.
//!
//! Documents are kept in their serialized form so filters, unique keys and
//! skipped fields behave exactly as they do against PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Document, Filter, Repository, Sort, StoreError, StoreResult};

struct Stored {
    created_at: DateTime<Utc>,
    doc: Value,
}

pub struct MemoryRepository<T> {
    docs: RwLock<HashMap<Uuid, Stored>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> MemoryRepository<T> {
    pub fn new() -> Self {
        Self { docs: RwLock::new(HashMap::new()), _marker: PhantomData }
    }

    fn check_unique(docs: &HashMap<Uuid, Stored>, candidate: &Value, except: Option<Uuid>) -> StoreResult<()> {
        for key in T::UNIQUE_KEYS {
            let Some(wanted) = key.key_of(candidate) else { continue };
            let clash = docs
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .any(|(_, stored)| key.key_of(&stored.doc).as_ref() == Some(&wanted));
            if clash {
                return Err(StoreError::Conflict { collection: T::COLLECTION, key: key.name.to_string() });
            }
        }
        Ok(())
    }
}

impl<T: Document> Default for MemoryRepository<T> {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl<T: Document> Repository<T> for MemoryRepository<T> {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<T>> {
        let docs = self.docs.read().await;
        docs.get(&id).map(|s| serde_json::from_value(s.doc.clone())).transpose().map_err(StoreError::from)
    }

    async fn find(&self, filter: Filter, sort: Sort) -> StoreResult<Vec<T>> {
        let docs = self.docs.read().await;
        let mut hits: Vec<(DateTime<Utc>, Uuid, &Value)> = docs
            .iter()
            .filter(|(_, s)| filter.matches(&s.doc))
            .map(|(id, s)| (s.created_at, *id, &s.doc))
            .collect();
        hits.sort_by_key(|(created_at, id, _)| (*created_at, *id));
        if sort == Sort::NewestFirst {
            hits.reverse();
        }
        hits.into_iter().map(|(_, _, doc)| serde_json::from_value(doc.clone()).map_err(StoreError::from)).collect()
    }

    async fn create(&self, doc: T) -> StoreResult<T> {
        let value = serde_json::to_value(&doc)?;
        let mut docs = self.docs.write().await;
        if docs.contains_key(&doc.id()) {
            return Err(StoreError::Conflict { collection: T::COLLECTION, key: "id".to_string() });
        }
        Self::check_unique(&docs, &value, None)?;
        docs.insert(doc.id(), Stored { created_at: doc.created_at(), doc: value });
        Ok(doc)
    }

    async fn save(&self, doc: T) -> StoreResult<T> {
        let value = serde_json::to_value(&doc)?;
        let mut docs = self.docs.write().await;
        if !docs.contains_key(&doc.id()) {
            return Err(StoreError::Missing { collection: T::COLLECTION, id: doc.id() });
        }
        Self::check_unique(&docs, &value, Some(doc.id()))?;
        if let Some(stored) = docs.get_mut(&doc.id()) {
            stored.doc = value;
        }
        Ok(doc)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.docs.write().await.remove(&id).is_some())
    }
}

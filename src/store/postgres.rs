//! PostgreSQL document store.
//!
//! One table per collection: `(id UUID PRIMARY KEY, doc JSONB, created_at,
//! updated_at)`. Filters run as `doc @> $1` backed by a GIN index, and every
//! [`UniqueKey`] becomes a partial unique expression index.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;

use super::{Document, Filter, Repository, Sort, StoreError, StoreResult, UniqueKey};

pub struct PgRepository<T> {
    pool: PgPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> PgRepository<T> {
    /// Wraps the pool and makes sure the collection's table and indexes exist.
    pub async fn connect(pool: PgPool) -> StoreResult<Self> {
        let repo = Self { pool, _marker: PhantomData };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let table = T::COLLECTION;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {table}_doc_idx ON {table} USING GIN (doc jsonb_path_ops)"))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {table}_created_idx ON {table} (created_at DESC)"))
            .execute(&self.pool)
            .await?;

        for key in T::UNIQUE_KEYS {
            sqlx::query(&unique_index_ddl(table, key)).execute(&self.pool).await?;
        }
        debug!(collection = table, "Schema ready");
        Ok(())
    }

    fn write_error(err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let constraint = db.constraint().unwrap_or_default();
                let key = T::UNIQUE_KEYS
                    .iter()
                    .find(|k| index_name(T::COLLECTION, k) == constraint)
                    .map(|k| k.name.to_string())
                    .unwrap_or_else(|| constraint.to_string());
                return StoreError::Conflict { collection: T::COLLECTION, key };
            }
        }
        StoreError::Database(err)
    }
}

fn index_name(table: &str, key: &UniqueKey) -> String {
    format!("{table}_{}_key", key.name)
}

fn unique_index_ddl(table: &str, key: &UniqueKey) -> String {
    let columns = key.fields.iter().map(|f| format!("(doc->>'{f}')")).collect::<Vec<_>>().join(", ");
    let mut predicates: Vec<String> = key.fields.iter().map(|f| format!("doc->>'{f}' IS NOT NULL")).collect();
    if let Some((field, values)) = key.only_when {
        let list = values.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", ");
        predicates.push(format!("doc->>'{field}' IN ({list})"));
    }
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} ({columns}) WHERE {}",
        index_name(table, key),
        predicates.join(" AND ")
    )
}

#[async_trait]
impl<T: Document> Repository<T> for PgRepository<T> {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<T>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", T::COLLECTION);
        let row = sqlx::query_scalar::<_, Value>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(serde_json::from_value).transpose()?)
    }

    async fn find(&self, filter: Filter, sort: Sort) -> StoreResult<Vec<T>> {
        let direction = match sort { Sort::NewestFirst => "DESC", Sort::OldestFirst => "ASC" };
        let sql = format!(
            "SELECT doc FROM {} WHERE doc @> $1 ORDER BY created_at {direction}, id {direction}",
            T::COLLECTION
        );
        let rows = sqlx::query_scalar::<_, Value>(&sql).bind(filter.to_value()).fetch_all(&self.pool).await?;
        rows.into_iter().map(|doc| serde_json::from_value(doc).map_err(StoreError::from)).collect()
    }

    async fn create(&self, doc: T) -> StoreResult<T> {
        let sql = format!("INSERT INTO {} (id, doc, created_at, updated_at) VALUES ($1, $2, $3, $4)", T::COLLECTION);
        sqlx::query(&sql)
            .bind(doc.id())
            .bind(serde_json::to_value(&doc)?)
            .bind(doc.created_at())
            .bind(doc.updated_at())
            .execute(&self.pool)
            .await
            .map_err(Self::write_error)?;
        Ok(doc)
    }

    async fn save(&self, doc: T) -> StoreResult<T> {
        let sql = format!("UPDATE {} SET doc = $2, updated_at = $3 WHERE id = $1", T::COLLECTION);
        let result = sqlx::query(&sql)
            .bind(doc.id())
            .bind(serde_json::to_value(&doc)?)
            .bind(doc.updated_at())
            .execute(&self.pool)
            .await
            .map_err(Self::write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing { collection: T::COLLECTION, id: doc.id() });
        }
        Ok(doc)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", T::COLLECTION);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

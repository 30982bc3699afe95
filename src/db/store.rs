//! Resource store over the `resources` table.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::model::{Metadata, Object, Query};
use crate::resources::ResourceId;
use crate::store::parts::{self, StorageKind, StorageParts};
use crate::store::{DeleteOptions, SaveOptions, StorageClient, etag};
use crate::telemetry::{metrics, spans};

const BACKEND: &str = "postgres";

#[derive(sqlx::FromRow)]
struct ResourceRow {
    original_id: String,
    api_version: String,
    content_type: String,
    etag: String,
    resource_data: serde_json::Value,
}

impl ResourceRow {
    fn try_into_object(self) -> Result<Object> {
        Ok(Object {
            metadata: Metadata {
                id: ResourceId::parse(&self.original_id)?,
                api_version: self.api_version,
                content_type: self.content_type,
                etag: Some(self.etag),
            },
            data: self.resource_data,
        })
    }
}

impl super::Db {
    /// Fetch one stored object.
    pub async fn get_resource(&self, id: &ResourceId) -> Result<Object> {
        parts::validate_storable(id)?;
        let row: Option<ResourceRow> = sqlx::query_as(
            "SELECT original_id, api_version, content_type, etag, resource_data
             FROM resources WHERE id = $1",
        )
        .bind(id.normalized())
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?
            .try_into_object()
    }

    /// Upsert, or conditional update when `options.etag` is set.
    pub async fn save_resource(&self, mut object: Object, options: &SaveOptions) -> Result<Object> {
        let parts = StorageParts::from_id(object.id())?;
        let token = etag::next(&object.data)?;

        let affected = match &options.etag {
            None => sqlx::query(
                "INSERT INTO resources (id, original_id, kind, resource_type, root_scope, routing_scope,
                                        api_version, content_type, etag, resource_data)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                     original_id = EXCLUDED.original_id,
                     api_version = EXCLUDED.api_version,
                     content_type = EXCLUDED.content_type,
                     etag = EXCLUDED.etag,
                     resource_data = EXCLUDED.resource_data,
                     updated_at = now()",
            )
            .bind(object.id().normalized())
            .bind(object.id().as_str())
            .bind(parts.kind.as_str())
            .bind(&parts.resource_type)
            .bind(&parts.root_scope)
            .bind(&parts.routing_scope)
            .bind(&object.metadata.api_version)
            .bind(&object.metadata.content_type)
            .bind(&token)
            .bind(&object.data)
            .execute(self.pool())
            .await?
            .rows_affected(),
            Some(expected) => sqlx::query(
                "UPDATE resources SET
                     original_id = $2,
                     api_version = $3,
                     content_type = $4,
                     etag = $5,
                     resource_data = $6,
                     updated_at = now()
                 WHERE id = $1 AND etag = $7",
            )
            .bind(object.id().normalized())
            .bind(object.id().as_str())
            .bind(&object.metadata.api_version)
            .bind(&object.metadata.content_type)
            .bind(&token)
            .bind(&object.data)
            .bind(expected)
            .execute(self.pool())
            .await?
            .rows_affected(),
        };

        if affected == 0 {
            return Err(Error::ConcurrencyConflict);
        }

        object.metadata.etag = Some(token);
        Ok(object)
    }

    pub async fn delete_resource(&self, id: &ResourceId, options: &DeleteOptions) -> Result<()> {
        parts::validate_storable(id)?;

        match &options.etag {
            None => {
                let affected = sqlx::query("DELETE FROM resources WHERE id = $1")
                    .bind(id.normalized())
                    .execute(self.pool())
                    .await?
                    .rows_affected();
                if affected == 0 {
                    return Err(Error::NotFound(id.to_string()));
                }
            }
            Some(expected) => {
                let affected = sqlx::query("DELETE FROM resources WHERE id = $1 AND etag = $2")
                    .bind(id.normalized())
                    .bind(expected)
                    .execute(self.pool())
                    .await?
                    .rows_affected();
                if affected == 0 {
                    return Err(Error::ConcurrencyConflict);
                }
            }
        }
        Ok(())
    }

    /// Structural matching happens in SQL; data filters are applied here.
    pub async fn query_resources(&self, query: &Query) -> Result<Vec<Object>> {
        query.validate()?;

        let kind = if query.is_scope_query {
            StorageKind::Scope
        } else {
            StorageKind::Resource
        };
        let root = parts::normalize_part(&query.root_scope.root_scope());
        let routing_prefix = query
            .routing_scope_prefix
            .as_deref()
            .map(|p| super::like_prefix(&parts::normalize_part(p)));
        let resource_type = query.resource_type.as_deref().map(parts::normalize_type);

        let rows: Vec<ResourceRow> = sqlx::query_as(
            "SELECT original_id, api_version, content_type, etag, resource_data
             FROM resources
             WHERE kind = $1
               AND (root_scope = $2 OR ($3 AND root_scope LIKE $4))
               AND ($5::text IS NULL OR routing_scope LIKE $5)
               AND ($6::text IS NULL OR resource_type = $6)
             ORDER BY created_at ASC",
        )
        .bind(kind.as_str())
        .bind(&root)
        .bind(query.scope_recursive)
        .bind(super::like_prefix(&root))
        .bind(routing_prefix)
        .bind(resource_type)
        .fetch_all(self.pool())
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let object = row.try_into_object()?;
            if query.filters.iter().all(|f| f.matches(&object.data)) {
                items.push(object);
            }
        }
        Ok(items)
    }
}

/// [`StorageClient`] backed by Postgres.
#[derive(Clone)]
pub struct PostgresStorageClient {
    db: super::Db,
}

impl PostgresStorageClient {
    pub fn new(db: super::Db) -> Self {
        Self { db }
    }
}

fn record<T>(operation: &'static str, result: &Result<T>) {
    metrics::storage_operations().add(
        1,
        &[
            KeyValue::new("backend", BACKEND),
            KeyValue::new("operation", operation),
            KeyValue::new("result", metrics::result_label(result)),
        ],
    );
    if let Err(e) = result {
        if e.is_backend() {
            tracing::error!(operation = operation, error = %e, "storage backend error");
        }
    }
}

#[async_trait]
impl StorageClient for PostgresStorageClient {
    async fn get(&self, id: &ResourceId) -> Result<Object> {
        let result = self
            .db
            .get_resource(id)
            .instrument(spans::storage_span(BACKEND, "get", id))
            .await;
        record("get", &result);
        result
    }

    async fn save(&self, object: Object, options: &SaveOptions) -> Result<Object> {
        let span = spans::storage_span(BACKEND, "save", object.id());
        let result = self.db.save_resource(object, options).instrument(span).await;
        record("save", &result);
        result
    }

    async fn delete(&self, id: &ResourceId, options: &DeleteOptions) -> Result<()> {
        let result = self
            .db
            .delete_resource(id, options)
            .instrument(spans::storage_span(BACKEND, "delete", id))
            .await;
        record("delete", &result);
        result
    }

    async fn query(&self, query: &Query) -> Result<Vec<Object>> {
        let span = spans::query_span(BACKEND, &query.root_scope, query.is_scope_query);
        let result = self.db.query_resources(query).instrument(span.clone()).await;
        if let Ok(items) = &result {
            span.record("storage.results", items.len() as u64);
        }
        record("query", &result);
        result
    }
}

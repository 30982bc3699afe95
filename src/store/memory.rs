//! In-memory storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{Object, Query};
use crate::resources::ResourceId;
use crate::store::parts::{self, StorageParts};
use crate::store::{DeleteOptions, SaveOptions, StorageClient, etag};
use crate::telemetry::{metrics, spans};

use opentelemetry::KeyValue;
use tracing::Instrument;

const BACKEND: &str = "memory";

struct Entry {
    parts: StorageParts,
    object: Object,
}

/// Sorted map keyed by [`StorageParts::key`], so scope and prefix queries
/// are range scans.
#[derive(Default)]
pub struct MemoryStorageClient {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn record(operation: &'static str, result: &str) {
    metrics::storage_operations().add(
        1,
        &[
            KeyValue::new("backend", BACKEND),
            KeyValue::new("operation", operation),
            KeyValue::new("result", result.to_string()),
        ],
    );
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    async fn get(&self, id: &ResourceId) -> Result<Object> {
        let result: Result<Object> = async {
            let key = StorageParts::from_id(id)?.key();
            let entries = self.entries.read().await;
            entries
                .get(&key)
                .map(|entry| entry.object.clone())
                .ok_or_else(|| Error::NotFound(id.to_string()))
        }
        .instrument(spans::storage_span(BACKEND, "get", id))
        .await;

        record("get", metrics::result_label(&result));
        result
    }

    async fn save(&self, mut object: Object, options: &SaveOptions) -> Result<Object> {
        let span = spans::storage_span(BACKEND, "save", object.id());
        let result: Result<Object> = async {
            let parts = StorageParts::from_id(object.id())?;
            let key = parts.key();
            let token = etag::next(&object.data)?;

            let mut entries = self.entries.write().await;
            if let Some(expected) = &options.etag {
                match entries.get(&key) {
                    Some(existing) if existing.object.etag() == Some(expected.as_str()) => {}
                    _ => return Err(Error::ConcurrencyConflict),
                }
            }

            object.metadata.etag = Some(token);
            entries.insert(
                key,
                Entry {
                    parts,
                    object: object.clone(),
                },
            );
            Ok(object)
        }
        .instrument(span)
        .await;

        record("save", metrics::result_label(&result));
        result
    }

    async fn delete(&self, id: &ResourceId, options: &DeleteOptions) -> Result<()> {
        let result: Result<()> = async {
            let key = StorageParts::from_id(id)?.key();
            let mut entries = self.entries.write().await;

            match (&options.etag, entries.get(&key)) {
                (None, None) => return Err(Error::NotFound(id.to_string())),
                (Some(_), None) => return Err(Error::ConcurrencyConflict),
                (Some(expected), Some(existing))
                    if existing.object.etag() != Some(expected.as_str()) =>
                {
                    return Err(Error::ConcurrencyConflict);
                }
                _ => {}
            }

            entries.remove(&key);
            Ok(())
        }
        .instrument(spans::storage_span(BACKEND, "delete", id))
        .await;

        record("delete", metrics::result_label(&result));
        result
    }

    async fn query(&self, query: &Query) -> Result<Vec<Object>> {
        let span = spans::query_span(BACKEND, &query.root_scope, query.is_scope_query);
        let result: Result<Vec<Object>> = async {
            query.validate()?;

            let prefix = parts::query_key_prefix(query);
            let entries = self.entries.read().await;
            let items: Vec<Object> = entries
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .filter(|(_, entry)| parts::parts_match_query(&entry.parts, query))
                .filter(|(_, entry)| query.filters.iter().all(|f| f.matches(&entry.object.data)))
                .map(|(_, entry)| entry.object.clone())
                .collect();

            tracing::Span::current().record("storage.results", items.len() as u64);
            Ok(items)
        }
        .instrument(span)
        .await;

        record("query", metrics::result_label(&result));
        result
    }
}

//! Backend selection from configuration.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::secrets::redacted_host;
use crate::config::{Config, QueueProvider, StorageProvider};
use crate::db::{Db, PostgresQueueClient, PostgresStorageClient};
use crate::error::{Error, Result};
use crate::queue::{MemoryQueueClient, QueueClient};
use crate::store::{MemoryStorageClient, StorageClient};

/// The store and queue selected by a [`Config`].
pub struct Backends {
    pub storage: Arc<dyn StorageClient>,
    pub queue: Arc<dyn QueueClient>,
    /// Present when either backend is Postgres.
    pub db: Option<Db>,
}

impl Backends {
    /// In-memory store and queue.
    pub fn in_memory(queue_name: &str) -> Self {
        Self {
            storage: Arc::new(MemoryStorageClient::new()),
            queue: Arc::new(MemoryQueueClient::new(queue_name)),
            db: None,
        }
    }

    /// Connect whatever `config` selects. Postgres migrations are not run
    /// here; call [`Db::migrate`] when the schema may be behind.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let db = match (&config.database.url, config.needs_database()) {
            (Some(url), true) => {
                let db = Db::connect(url.expose_secret()).await?;
                tracing::info!(host = %redacted_host(url), "database connected");
                Some(db)
            }
            (None, true) => {
                return Err(Error::Config("database url is required".to_string()));
            }
            (_, false) => None,
        };

        let storage: Arc<dyn StorageClient> = match (config.storage.provider, &db) {
            (StorageProvider::Memory, _) => Arc::new(MemoryStorageClient::new()),
            (StorageProvider::Postgres, Some(db)) => Arc::new(PostgresStorageClient::new(db.clone())),
            (StorageProvider::Postgres, None) => {
                return Err(Error::Config("postgres storage needs a database".to_string()));
            }
        };

        let queue: Arc<dyn QueueClient> = match (config.queue.provider, &db) {
            (QueueProvider::Memory, _) => Arc::new(
                MemoryQueueClient::new(config.queue.name.clone())
                    .with_lease_duration(config.lease_duration()),
            ),
            (QueueProvider::Postgres, Some(db)) => Arc::new(
                PostgresQueueClient::new(db.clone(), config.queue.name.clone())
                    .with_lease_duration(config.lease_duration()),
            ),
            (QueueProvider::Postgres, None) => {
                return Err(Error::Config("postgres queue needs a database".to_string()));
            }
        };

        tracing::info!(
            storage = %config.storage.provider,
            queue = %config.queue.provider,
            queue_name = %config.queue.name,
            "backends selected"
        );

        Ok(Self { storage, queue, db })
    }
}

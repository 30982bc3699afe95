//! Resource store: optimistic-concurrency CRUD and hierarchical query.
//!
//! [`StorageClient`] is the backend-agnostic contract. The in-memory
//! backend lives in [`memory`]; the Postgres backend in [`crate::db`].

pub mod etag;
pub mod memory;
pub mod parts;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Object, Query};
use crate::resources::ResourceId;

pub use memory::MemoryStorageClient;
pub use parts::{StorageKind, StorageParts, normalize_part};

/// Preconditions for [`StorageClient::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Only write if the stored token equals this value. A missing record
    /// never matches.
    pub etag: Option<String>,
}

impl SaveOptions {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
        }
    }
}

/// Preconditions for [`StorageClient::delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub etag: Option<String>,
}

impl DeleteOptions {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
        }
    }
}

/// The resource store contract.
///
/// Implementations are stateless facades over a shared backend and hold
/// no cached objects. Every operation is complete (or has had no effect)
/// by the time it returns.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fails `NotFound` when nothing is stored at `id`.
    async fn get(&self, id: &ResourceId) -> Result<Object>;

    /// Replace the stored value for `object.metadata.id` and return it with
    /// its new concurrency token. Fails `ConcurrencyConflict` if an `etag`
    /// precondition does not hold.
    async fn save(&self, object: Object, options: &SaveOptions) -> Result<Object>;

    /// Fails `NotFound` when absent and no token was given, and
    /// `ConcurrencyConflict` when a token was given and does not match.
    async fn delete(&self, id: &ResourceId, options: &DeleteOptions) -> Result<()>;

    /// Every object matching `query`, in no particular order.
    async fn query(&self, query: &Query) -> Result<Vec<Object>>;
}

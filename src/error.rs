//! Error types for controlplane-store.
//!
//! The first group of variants is the stable contract callers match on.
//! Everything that comes out of a backend (network, SQL, serialization) is
//! surfaced as-is in the second group; see [`Error::is_backend`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("the concurrency token did not match the stored value")]
    ConcurrencyConflict,

    #[error("message is empty")]
    EmptyMessage,

    #[error("no visible message in the queue")]
    MessageNotFound,

    #[error("message lease is no longer valid")]
    InvalidMessage,

    #[error("'{0}' is not a valid resource id")]
    MalformedIdentifier(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the opaque backend category: transport, SQL, serialization
    /// and other faults that are not part of the stable error contract.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Migration(_)
                | Error::Serialization(_)
                | Error::Io(_)
                | Error::Other(_)
        )
    }

    /// Expected conditions a well-behaved caller recovers from by re-reading
    /// or re-polling.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrencyConflict | Error::MessageNotFound | Error::InvalidMessage
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! # controlplane-store
//!
//! Persistence and task-dispatch substrate for a multi-cloud resource
//! control plane.
//!
//! Provides a hierarchical resource store with optimistic concurrency
//! ([`store`]), a lease-based work queue with a polling dequeuer
//! ([`queue`]), in-memory and Postgres backends for both, a worker pool
//! over the queue ([`engine`]), and OpenTelemetry observability.

pub mod cancel;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod provider;
pub mod queue;
pub mod resources;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
pub use model::{Message, NewMessage, Object, Query};
pub use queue::QueueClient;
pub use resources::ResourceId;
pub use store::StorageClient;

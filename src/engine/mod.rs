//! Async-operation engine: a worker pool over the queue.

pub mod worker;

pub use worker::{Handler, Outcome, WorkerOptions, WorkerPool};

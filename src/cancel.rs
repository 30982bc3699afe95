//! Caller-side cancellation and deadlines for store and queue calls.
//!
//! Each operation is one statement (Postgres) or one locked section
//! (memory), so no call is ever left half applied. What `Cancelled` and
//! `DeadlineExceeded` say about the outcome differs by backend:
//!
//! - Memory: the call either finished before the signal or never touched
//!   state. A signal that is already raised when the call starts always
//!   wins, so such a call has no effect.
//! - Postgres: dropping the future after the statement was sent does not
//!   stop the server. The write may still commit even though the caller
//!   sees `Cancelled` or `DeadlineExceeded`. Treat the outcome as unknown
//!   and re-read before retrying a conditional write.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run `op` unless `cancel` fires first, in which case `Error::Cancelled`.
pub async fn with_cancel<T, F>(cancel: &CancellationToken, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = op => result,
    }
}

/// Run `op` with a deadline, failing `Error::DeadlineExceeded` when it
/// passes. A zero deadline fails without starting `op`.
pub async fn with_timeout<T, F>(timeout: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return Err(Error::DeadlineExceeded);
    }
    tokio::time::timeout(timeout, op)
        .await
        .unwrap_or(Err(Error::DeadlineExceeded))
}

/// Both: cancellation wins over the deadline when they coincide.
pub async fn with_cancel_and_timeout<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    op: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_cancel(cancel, with_timeout(timeout, op)).await
}

//! Pool error types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request was dropped without running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropReason {
    /// Rejected at admission while the pool was overloaded
    Overloaded,
    /// Removed from the queue by `clear_queue` or `dispose`
    Cleared,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overloaded => write!(f, "pool overloaded"),
            Self::Cleared => write!(f, "queue cleared"),
        }
    }
}

/// Errors surfaced through a request's completion handle
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Request {id} dropped: {reason}")]
    Dropped { id: String, reason: DropReason },

    #[error("Request {id} timed out in queue after {waited:?} (timeout {timeout:?})")]
    QueueTimeout {
        id: String,
        waited: Duration,
        timeout: Duration,
    },

    /// The operation's own error, passed through untouched
    #[error(transparent)]
    Operation(eyre::Report),

    #[error("Pool {pool} is disposed")]
    Disposed { pool: String },
}

impl PoolError {
    /// Check if the request was shed or cleared
    pub fn is_dropped(&self) -> bool {
        matches!(self, PoolError::Dropped { .. })
    }

    /// Check if the request expired before it was dispatched
    pub fn is_queue_timeout(&self) -> bool {
        matches!(self, PoolError::QueueTimeout { .. })
    }

    /// Check if the operation itself failed
    pub fn is_operation(&self) -> bool {
        matches!(self, PoolError::Operation(_))
    }

    /// Check if resubmitting later (with backoff) is reasonable
    ///
    /// Drops signal sustained overload and should not be retried immediately;
    /// operation errors are the caller's call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::QueueTimeout { .. })
    }

    /// Recover the operation's original error, if that is what failed
    pub fn into_operation_error(self) -> Option<eyre::Report> {
        match self {
            PoolError::Operation(report) => Some(report),
            _ => None,
        }
    }
}

/// Result type for pool requests
pub type PoolResult<T> = Result<T, PoolError>;

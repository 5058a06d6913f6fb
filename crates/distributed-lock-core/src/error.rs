//! Error types for distributed lock operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The resource is already held by another lock id.
    #[error("resource is already locked: {0}")]
    AlreadyLocked(String),

    /// The retry budget of an acquire or unlock ran out.
    #[error("retry budget exhausted after {0:?}")]
    Timeout(Duration),

    /// The lock manager is shutting down.
    #[error("lock manager is closing")]
    Closing,

    /// The caller cancelled the operation.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// Configuration rejected by validation.
    #[error("invalid lock configuration: {0}")]
    InvalidConfig(String),

    /// Invalid namespace, resource id or owner.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Backend connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Backend-specific error.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    /// Returns `true` if the primitive reported the resource as held.
    pub fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked(_))
    }

    /// Returns `true` if the operation ran out of retry budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if the error only reflects a normal shutdown.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Closing)
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

//! Collaborator traits consumed by the lock manager.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

// ============================================================================
// Lock Client Trait
// ============================================================================

/// Atomic exclusive-lock primitive backed by a shared store.
///
/// Implementations must make `xlock` a single atomic conditional write: at most
/// one lock id may hold a given resource name until it is released or its TTL
/// expires.
///
/// # Example
///
/// ```rust,ignore
/// match client.xlock("jobs-nightly", &lock_id, Duration::from_secs(30)).await {
///     Ok(()) => { /* we own "jobs-nightly" */ }
///     Err(LockError::AlreadyLocked(_)) => { /* somebody else does */ }
///     Err(e) => return Err(e),
/// }
/// ```
pub trait LockClient: Send + Sync {
    /// Takes an exclusive lock on `resource_name` under `lock_id` for `ttl`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Lock taken
    /// * `Err(LockError::AlreadyLocked)` - Resource is held by another lock id
    /// * `Err(...)` - Any other backend fault
    fn xlock(
        &self,
        resource_name: &str,
        lock_id: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Releases the lock held under `lock_id`.
    ///
    /// Releasing a lock that already expired is not an error.
    fn unlock(&self, lock_id: &str) -> impl Future<Output = LockResult<()>> + Send;
}

// ============================================================================
// Purger Trait
// ============================================================================

/// Best-effort removal of lock records whose TTL has expired.
pub trait Purger: Send + Sync {
    /// Removes expired lock records.
    fn purge(&self) -> impl Future<Output = LockResult<()>> + Send;
}

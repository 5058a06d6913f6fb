//! Lock manager: retrying acquire/unlock, owner throttling and the purge loop.

use std::sync::Arc;
use std::time::Duration;

use distributed_lock_core::error::{LockError, LockResult};
use distributed_lock_core::traits::{LockClient, Purger};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, instrument, warn};

use crate::backoff::Jitter;
use crate::config::LockConfig;
use crate::lock_id::{create_lock_id, resource_name};
use crate::usage::{Throttle, Usage, UsageTracker};

/// One successful acquisition of a resource.
///
/// Pass it back to [`LockManager::unlock`] to release exactly this hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    lock_id: String,
    resource_id: String,
    owner: String,
}

impl HeldLock {
    /// Rebuilds a hold from its parts, e.g. a lock id persisted by the caller.
    ///
    /// `resource_id` and `owner` only feed the throttle's release time; the
    /// lock itself is released by `lock_id` alone.
    pub fn new(
        lock_id: impl Into<String>,
        resource_id: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            lock_id: lock_id.into(),
            resource_id: resource_id.into(),
            owner: owner.into(),
        }
    }

    /// Unique id of this acquisition, `{namespace}-{resource_id}-{nonce}`.
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Serializes workers across processes on named resources of one namespace.
///
/// Mutual exclusion itself comes from the [`LockClient`]; the manager adds
/// jittered retries on contention, persistent retries on release, throttling
/// of owners that re-take a resource too quickly, and a background task that
/// periodically purges expired locks.
///
/// # Example
///
/// Created through [`LockManagerBuilder`](crate::LockManagerBuilder).
///
/// ```rust,ignore
/// let manager = LockManagerBuilder::new("billing").build(store.clone(), store)?;
///
/// let held = manager.acquire("invoice-42", "worker-7").await?;
/// // Critical section
/// manager.unlock(held).await?;
///
/// manager.close().await;
/// ```
pub struct LockManager<C> {
    namespace: String,
    config: LockConfig,
    client: C,
    usages: Arc<UsageTracker>,
    jitter: Arc<dyn Jitter>,
    shutdown: CancellationToken,
    purge_done: watch::Receiver<bool>,
}

impl<C: LockClient> LockManager<C> {
    /// Wires in the collaborators and starts the purge loop.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start<P>(
        namespace: String,
        config: LockConfig,
        jitter: Arc<dyn Jitter>,
        client: C,
        purger: P,
    ) -> LockResult<Self>
    where
        P: Purger + 'static,
    {
        if namespace.is_empty() {
            return Err(LockError::InvalidName("namespace cannot be empty".to_string()));
        }
        config.validate()?;

        let usages = Arc::new(UsageTracker::new(
            config.time_threshold_since_last_release,
            config.usage_sleep,
            config.max_count,
        ));
        let shutdown = CancellationToken::new();
        let (done_tx, purge_done) = watch::channel(false);

        tokio::spawn(run_purger(
            purger,
            usages.clone(),
            config.purger_period,
            shutdown.clone(),
            done_tx,
        ));
        debug!(lock.namespace = %namespace, "lock manager started");

        Ok(Self {
            namespace,
            config,
            client,
            usages,
            jitter,
            shutdown,
            purge_done,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Snapshot of the throttling record of `owner` on `resource_id`.
    pub fn usage(&self, resource_id: &str, owner: &str) -> Option<Usage> {
        self.usages.get(resource_id, owner)
    }

    /// Makes a single attempt at locking `resource_id`.
    ///
    /// # Returns
    ///
    /// * `Ok(held)` - Lock taken
    /// * `Err(LockError::AlreadyLocked)` - Another lock id holds the resource
    /// * `Err(...)` - Any other error reported by the client
    #[instrument(skip(self), fields(lock.namespace = %self.namespace))]
    pub async fn lock(&self, resource_id: &str, owner: &str) -> LockResult<HeldLock> {
        check_name("resource id", resource_id)?;
        check_name("owner", owner)?;

        let lock_id = create_lock_id(&self.namespace, resource_id);
        self.client
            .xlock(
                &resource_name(&self.namespace, resource_id),
                &lock_id,
                self.config.ttl,
            )
            .await?;

        Ok(HeldLock {
            lock_id,
            resource_id: resource_id.to_string(),
            owner: owner.to_string(),
        })
    }

    /// Acquires `resource_id` for `owner`, retrying while it is contended.
    ///
    /// See [`acquire_with_cancel`](Self::acquire_with_cancel).
    pub async fn acquire(&self, resource_id: &str, owner: &str) -> LockResult<HeldLock> {
        self.acquire_with_cancel(&CancellationToken::new(), resource_id, owner)
            .await
    }

    /// Acquires `resource_id` for `owner`, retrying while it is contended.
    ///
    /// An owner that keeps re-taking the resource faster than the release
    /// threshold is first made to wait the configured usage sleep. Contended
    /// attempts are retried after a delay drawn from the acquire backoff window
    /// until the retry timeout, counted from the first contended attempt,
    /// runs out. Other errors are returned immediately.
    ///
    /// # Returns
    ///
    /// * `Ok(held)` - Lock acquired
    /// * `Err(LockError::Timeout)` - Still contended when the retry budget ran out
    /// * `Err(LockError::Closing)` - The manager was closed while waiting
    /// * `Err(LockError::Cancelled)` - `cancel` fired while waiting
    #[instrument(
        skip(self, cancel),
        fields(
            lock.namespace = %self.namespace,
            acquired = field::Empty,
            attempts = field::Empty,
            elapsed_ms = field::Empty,
        )
    )]
    pub async fn acquire_with_cancel(
        &self,
        cancel: &CancellationToken,
        resource_id: &str,
        owner: &str,
    ) -> LockResult<HeldLock> {
        if let Some(err) = self.interruption(cancel) {
            return Err(err);
        }

        let start = Instant::now();
        let throttle = self
            .usages
            .wait_if_needed(resource_id, owner, self.interrupted(cancel))
            .await;
        if throttle == Throttle::Interrupted {
            Span::current().record("acquired", false);
            return Err(self.interruption(cancel).unwrap_or(LockError::Cancelled));
        }

        let mut attempts: u32 = 0;
        let mut deadline: Option<Instant> = None;
        loop {
            attempts += 1;
            match self.lock(resource_id, owner).await {
                Ok(held) => {
                    self.usages.set_count(resource_id, owner);
                    let span = Span::current();
                    span.record("acquired", true);
                    span.record("attempts", attempts);
                    span.record("elapsed_ms", start.elapsed().as_millis() as u64);
                    return Ok(held);
                }
                Err(e) if e.is_already_locked() => {}
                Err(e) => {
                    Span::current().record("acquired", false);
                    return Err(e);
                }
            }

            let deadline =
                *deadline.get_or_insert_with(|| Instant::now() + self.config.acquire_retry_timeout);
            if Instant::now() >= deadline {
                let span = Span::current();
                span.record("acquired", false);
                span.record("attempts", attempts);
                return Err(LockError::Timeout(self.config.acquire_retry_timeout));
            }

            let delay = self
                .jitter
                .sample(self.config.acquire_min_period, self.config.acquire_max_period);
            if let Err(e) = self.sleep(cancel, delay).await {
                let span = Span::current();
                span.record("acquired", false);
                span.record("attempts", attempts);
                return Err(e);
            }
        }
    }

    /// Releases `held`.
    ///
    /// See [`unlock_with_cancel`](Self::unlock_with_cancel).
    pub async fn unlock(&self, held: HeldLock) -> LockResult<()> {
        self.unlock_with_cancel(&CancellationToken::new(), held).await
    }

    /// Releases `held`, retrying failed releases until the unlock retry
    /// timeout runs out.
    ///
    /// A lock that could not be released still expires once its TTL passes.
    /// Callers that kept only the lock id can release it through
    /// [`HeldLock::new`]. On success the release time is recorded for throttling.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Lock released
    /// * `Err(LockError::Timeout)` - Every attempt within the budget failed
    /// * `Err(LockError::Closing)` - The manager was closed between attempts
    /// * `Err(LockError::Cancelled)` - `cancel` fired between attempts
    #[instrument(
        skip(self, cancel, held),
        fields(
            lock.namespace = %self.namespace,
            lock.id = %held.lock_id,
            lock.owner = %held.owner,
            attempts = field::Empty,
        )
    )]
    pub async fn unlock_with_cancel(
        &self,
        cancel: &CancellationToken,
        held: HeldLock,
    ) -> LockResult<()> {
        let deadline = Instant::now() + self.config.unlock_retry_timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let err = match self.client.unlock(&held.lock_id).await {
                Ok(()) => {
                    self.usages
                        .set_released(&held.resource_id, &held.owner, Instant::now());
                    Span::current().record("attempts", attempts);
                    return Ok(());
                }
                Err(e) => e,
            };

            if Instant::now() >= deadline {
                Span::current().record("attempts", attempts);
                warn!(error = %err, "giving up on unlock, lock will expire with its ttl");
                return Err(LockError::Timeout(self.config.unlock_retry_timeout));
            }
            debug!(error = %err, attempt = attempts, "unlock failed, retrying");

            let delay = self
                .jitter
                .sample(self.config.unlock_min_period, self.config.unlock_max_period);
            if let Err(e) = self.sleep(cancel, delay).await {
                Span::current().record("attempts", attempts);
                warn!(error = %e, "unlock interrupted, lock will expire with its ttl");
                return Err(e);
            }
        }
    }

    /// Signals shutdown and waits until the purge loop has exited.
    ///
    /// Waiting acquires and unlocks return [`LockError::Closing`] at their next
    /// backoff. Safe to call any number of times, also concurrently.
    #[instrument(skip(self), fields(lock.namespace = %self.namespace))]
    pub async fn close(&self) {
        self.shutdown.cancel();

        let mut done = self.purge_done.clone();
        // An error means the loop is gone without reporting, which is just as final
        let _ = done.wait_for(|done| *done).await;
        debug!("lock manager closed");
    }

    /// Completes when either the manager shuts down or `cancel` fires.
    async fn interrupted(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = cancel.cancelled() => {}
        }
    }

    /// Error for whichever stop signal has fired, if any. Shutdown wins.
    fn interruption(&self, cancel: &CancellationToken) -> Option<LockError> {
        if self.shutdown.is_cancelled() {
            Some(LockError::Closing)
        } else if cancel.is_cancelled() {
            Some(LockError::Cancelled)
        } else {
            None
        }
    }

    async fn sleep(&self, cancel: &CancellationToken, delay: Duration) -> LockResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.interrupted(cancel) => {
                Err(self.interruption(cancel).unwrap_or(LockError::Cancelled))
            }
        }
    }
}

impl<C> Drop for LockManager<C> {
    fn drop(&mut self) {
        // Stop the purge loop; it cannot be awaited here
        self.shutdown.cancel();
    }
}

fn check_name(kind: &str, value: &str) -> LockResult<()> {
    if value.is_empty() {
        return Err(LockError::InvalidName(format!("{kind} cannot be empty")));
    }
    Ok(())
}

/// Purges expired locks and stale usage records every `period` until shutdown.
async fn run_purger<P: Purger>(
    purger: P,
    usages: Arc<UsageTracker>,
    period: Duration,
    shutdown: CancellationToken,
    done: watch::Sender<bool>,
) {
    loop {
        // Best effort, the TTL bounds staleness even if this never succeeds
        match purger.purge().await {
            Ok(()) => debug!("purged expired locks"),
            Err(e) => warn!(error = %e, "failed to purge expired locks"),
        }
        let removed = usages.purge();
        if removed > 0 {
            debug!(removed, "purged stale usage records");
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    done.send_replace(true);
    debug!("purge loop stopped");
}

//! Mock lock clients and purgers for testing the lock manager.

use distributed_lock_core::error::{LockError, LockResult};
use distributed_lock_core::traits::{LockClient, Purger};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// What a scripted call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    AlreadyLocked,
    Fault,
}

impl Outcome {
    fn into_result(self, name: &str) -> LockResult<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::AlreadyLocked => Err(LockError::AlreadyLocked(name.to_string())),
            Outcome::Fault => Err(LockError::Backend(Box::new(std::io::Error::other(
                "store unavailable",
            )))),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Option<Outcome>>,
    calls: AtomicUsize,
}

impl Script {
    fn next(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queued
            .lock()
            .pop_front()
            .or(*self.fallback.lock())
            .unwrap_or(Outcome::Ok)
    }
}

/// Lock client replaying scripted outcomes and counting calls.
///
/// Queued outcomes are used first, then the fallback (default: `Ok`).
#[derive(Clone, Default)]
pub struct ScriptedClient {
    xlock: Arc<Script>,
    unlock: Arc<Script>,
    resource_names: Arc<Mutex<Vec<String>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_xlock(self, outcomes: &[Outcome]) -> Self {
        self.xlock.queued.lock().extend(outcomes.iter().copied());
        self
    }

    pub fn xlock_fallback(self, outcome: Outcome) -> Self {
        *self.xlock.fallback.lock() = Some(outcome);
        self
    }

    pub fn queue_unlock(self, outcomes: &[Outcome]) -> Self {
        self.unlock.queued.lock().extend(outcomes.iter().copied());
        self
    }

    pub fn unlock_fallback(self, outcome: Outcome) -> Self {
        *self.unlock.fallback.lock() = Some(outcome);
        self
    }

    pub fn xlock_calls(&self) -> usize {
        self.xlock.calls.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock.calls.load(Ordering::SeqCst)
    }

    /// Resource names passed to `xlock`, in call order.
    pub fn resource_names(&self) -> Vec<String> {
        self.resource_names.lock().clone()
    }
}

impl LockClient for ScriptedClient {
    async fn xlock(&self, resource_name: &str, _lock_id: &str, _ttl: Duration) -> LockResult<()> {
        self.resource_names.lock().push(resource_name.to_string());
        self.xlock.next().into_result(resource_name)
    }

    async fn unlock(&self, lock_id: &str) -> LockResult<()> {
        self.unlock.next().into_result(lock_id)
    }
}

/// Purger counting its calls, optionally failing or taking time.
#[derive(Clone, Default)]
pub struct CountingPurger {
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    fail: bool,
    duration: Duration,
}

impl CountingPurger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Purger for CountingPurger {
    async fn purge(&self) -> LockResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LockError::Connection(Box::new(std::io::Error::other(
                "purge failed",
            ))));
        }
        Ok(())
    }
}

/// In-memory lock store with real exclusive-lock and TTL semantics.
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    locks: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    purges: Arc<AtomicUsize>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, resource_name: &str) -> bool {
        self.locks
            .lock()
            .get(resource_name)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    /// Number of records, expired ones included.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }
}

impl LockClient for MemoryLockStore {
    async fn xlock(&self, resource_name: &str, lock_id: &str, ttl: Duration) -> LockResult<()> {
        let now = Instant::now();
        let mut locks = self.locks.lock();
        if let Some((_, expires_at)) = locks.get(resource_name)
            && *expires_at > now
        {
            return Err(LockError::AlreadyLocked(resource_name.to_string()));
        }
        locks.insert(resource_name.to_string(), (lock_id.to_string(), now + ttl));
        Ok(())
    }

    async fn unlock(&self, lock_id: &str) -> LockResult<()> {
        self.locks.lock().retain(|_, (id, _)| id != lock_id);
        Ok(())
    }
}

impl Purger for MemoryLockStore {
    async fn purge(&self) -> LockResult<()> {
        let now = Instant::now();
        self.locks
            .lock()
            .retain(|_, (_, expires_at)| *expires_at > now);
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Lock manager over an atomic lock primitive.
//!
//! [`LockManager`] turns a single-shot exclusive lock on a shared store into a
//! blocking acquire with jittered retries, a release that keeps retrying, an
//! anti-starvation throttle for owners that re-take a resource too quickly and
//! a background purge of expired locks.

pub mod backoff;
pub mod builder;
pub mod config;
pub mod lock_id;
pub mod manager;
pub mod usage;

pub use backoff::{FixedJitter, Jitter, UniformJitter};
pub use builder::LockManagerBuilder;
pub use config::{LockConfig, LockConfigOverrides, MIN_PURGER_PERIOD};
pub use manager::{HeldLock, LockManager};
pub use usage::{Throttle, Usage, UsageTracker};

//! Timing configuration for the lock manager.

use std::time::Duration;

use distributed_lock_core::error::{LockError, LockResult};
use serde::{Deserialize, Serialize};

/// Smallest accepted interval between purge sweeps.
pub const MIN_PURGER_PERIOD: Duration = Duration::from_secs(1);

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_PURGER_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ACQUIRE_MIN_PERIOD: Duration = Duration::from_millis(50);
pub const DEFAULT_ACQUIRE_MAX_PERIOD: Duration = Duration::from_millis(150);
pub const DEFAULT_ACQUIRE_RETRY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_UNLOCK_MIN_PERIOD: Duration = Duration::from_millis(5);
pub const DEFAULT_UNLOCK_MAX_PERIOD: Duration = Duration::from_millis(10);
pub const DEFAULT_UNLOCK_RETRY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TIME_THRESHOLD_SINCE_LAST_RELEASE: Duration = Duration::from_millis(100);
pub const DEFAULT_USAGE_SLEEP: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_COUNT: u32 = 10;

/// Validated timing parameters of a [`LockManager`](crate::LockManager).
///
/// A config is immutable once handed to a manager; each manager owns its own
/// copy, so independent managers never share tuning state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// How long a lock stays valid in the store without an explicit release.
    pub ttl: Duration,
    /// Interval between purge sweeps.
    pub purger_period: Duration,
    /// Lower bound of the backoff between acquire attempts.
    pub acquire_min_period: Duration,
    /// Upper bound of the backoff between acquire attempts.
    pub acquire_max_period: Duration,
    /// Budget for one acquire, measured from the first contended attempt.
    pub acquire_retry_timeout: Duration,
    /// Lower bound of the backoff between unlock attempts.
    pub unlock_min_period: Duration,
    /// Upper bound of the backoff between unlock attempts.
    pub unlock_max_period: Duration,
    /// Budget for one unlock.
    pub unlock_retry_timeout: Duration,
    /// Re-acquisitions closer than this to the last release count as rapid.
    pub time_threshold_since_last_release: Duration,
    /// Forced pause once an owner reaches `max_count` rapid re-acquisitions.
    pub usage_sleep: Duration,
    /// Rapid re-acquisitions tolerated before the owner is throttled.
    pub max_count: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            purger_period: DEFAULT_PURGER_PERIOD,
            acquire_min_period: DEFAULT_ACQUIRE_MIN_PERIOD,
            acquire_max_period: DEFAULT_ACQUIRE_MAX_PERIOD,
            acquire_retry_timeout: DEFAULT_ACQUIRE_RETRY_TIMEOUT,
            unlock_min_period: DEFAULT_UNLOCK_MIN_PERIOD,
            unlock_max_period: DEFAULT_UNLOCK_MAX_PERIOD,
            unlock_retry_timeout: DEFAULT_UNLOCK_RETRY_TIMEOUT,
            time_threshold_since_last_release: DEFAULT_TIME_THRESHOLD_SINCE_LAST_RELEASE,
            usage_sleep: DEFAULT_USAGE_SLEEP,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl LockConfig {
    /// Builds a config from the defaults with every present override applied.
    pub fn from_overrides(overrides: Option<&LockConfigOverrides>) -> Self {
        let mut config = Self::default();
        if let Some(overrides) = overrides {
            overrides.apply_to(&mut config);
        }
        config
    }

    /// Checks every invariant, reporting the first one that is violated.
    ///
    /// Nothing is corrected: an invalid config must be fixed by the caller.
    pub fn validate(&self) -> LockResult<()> {
        if self.ttl.is_zero() {
            return Err(invalid("ttl must be greater than zero"));
        }
        if self.purger_period < MIN_PURGER_PERIOD {
            return Err(invalid(format!(
                "purger_period ({:?}) must be at least {:?}",
                self.purger_period, MIN_PURGER_PERIOD
            )));
        }
        if self.acquire_max_period <= self.acquire_min_period {
            return Err(invalid(format!(
                "acquire_max_period ({:?}) must be greater than acquire_min_period ({:?})",
                self.acquire_max_period, self.acquire_min_period
            )));
        }
        if self.acquire_retry_timeout.is_zero() {
            return Err(invalid("acquire_retry_timeout must be greater than zero"));
        }
        if self.unlock_max_period <= self.unlock_min_period {
            return Err(invalid(format!(
                "unlock_max_period ({:?}) must be greater than unlock_min_period ({:?})",
                self.unlock_max_period, self.unlock_min_period
            )));
        }
        if self.unlock_retry_timeout.is_zero() {
            return Err(invalid("unlock_retry_timeout must be greater than zero"));
        }
        if self.max_count < 1 {
            return Err(invalid("max_count must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> LockError {
    LockError::InvalidConfig(msg.into())
}

/// Optional overrides for [`LockConfig`], one nullable field per parameter.
///
/// Field names and units follow the external configuration surface, so the
/// struct can be deserialized straight from a JSON/YAML settings section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LockConfigOverrides {
    /// Seconds.
    pub ttl: Option<u64>,
    /// Seconds.
    pub purger_period: Option<u64>,
    pub acquire_min_period_millis: Option<u64>,
    pub acquire_max_period_millis: Option<u64>,
    /// Milliseconds.
    pub acquire_retry_timeout: Option<u64>,
    pub unlock_min_period_millis: Option<u64>,
    pub unlock_max_period_millis: Option<u64>,
    /// Milliseconds.
    pub unlock_retry_timeout: Option<u64>,
    /// Milliseconds.
    pub time_threshold_since_last_release: Option<u64>,
    /// Milliseconds.
    pub usage_sleep: Option<u64>,
    pub max_count: Option<u32>,
}

impl LockConfigOverrides {
    fn apply_to(&self, config: &mut LockConfig) {
        let secs = Duration::from_secs;
        let millis = Duration::from_millis;

        if let Some(v) = self.ttl {
            config.ttl = secs(v);
        }
        if let Some(v) = self.purger_period {
            config.purger_period = secs(v);
        }
        if let Some(v) = self.acquire_min_period_millis {
            config.acquire_min_period = millis(v);
        }
        if let Some(v) = self.acquire_max_period_millis {
            config.acquire_max_period = millis(v);
        }
        if let Some(v) = self.acquire_retry_timeout {
            config.acquire_retry_timeout = millis(v);
        }
        if let Some(v) = self.unlock_min_period_millis {
            config.unlock_min_period = millis(v);
        }
        if let Some(v) = self.unlock_max_period_millis {
            config.unlock_max_period = millis(v);
        }
        if let Some(v) = self.unlock_retry_timeout {
            config.unlock_retry_timeout = millis(v);
        }
        if let Some(v) = self.time_threshold_since_last_release {
            config.time_threshold_since_last_release = millis(v);
        }
        if let Some(v) = self.usage_sleep {
            config.usage_sleep = millis(v);
        }
        if let Some(v) = self.max_count {
            config.max_count = v;
        }
    }
}

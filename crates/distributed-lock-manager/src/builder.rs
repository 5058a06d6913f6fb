//! Lock manager construction.

use std::sync::Arc;

use distributed_lock_core::error::LockResult;
use distributed_lock_core::traits::{LockClient, Purger};

use crate::backoff::{Jitter, UniformJitter};
use crate::config::{LockConfig, LockConfigOverrides};
use crate::manager::LockManager;

/// Builder for [`LockManager`] configuration.
pub struct LockManagerBuilder {
    namespace: String,
    config: LockConfig,
    jitter: Arc<dyn Jitter>,
}

impl LockManagerBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Every resource locked through the manager is prefixed with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            config: LockConfig::default(),
            jitter: Arc::new(UniformJitter),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the defaults with the present `overrides` applied.
    pub fn overrides(mut self, overrides: &LockConfigOverrides) -> Self {
        self.config = LockConfig::from_overrides(Some(overrides));
        self
    }

    /// Sets how retry delays are picked within their backoff window.
    pub fn jitter(mut self, jitter: impl Jitter + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Validates the configuration and starts the manager.
    ///
    /// The purge loop is spawned on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LockError::InvalidConfig` naming the violated invariant, or
    /// `LockError::InvalidName` for an empty namespace.
    pub fn build<C, P>(self, client: C, purger: P) -> LockResult<LockManager<C>>
    where
        C: LockClient,
        P: Purger + 'static,
    {
        LockManager::start(self.namespace, self.config, self.jitter, client, purger)
    }
}

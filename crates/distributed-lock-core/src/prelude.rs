//! Convenience prelude for distributed lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::traits::{LockClient, Purger};

//! Core traits and types for document-store backed distributed locks.

pub mod error;
pub mod prelude;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;

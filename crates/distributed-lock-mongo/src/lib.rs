//! MongoDB backend for the distributed lock manager.

pub mod document;
pub mod store;

pub use document::LockDocument;
pub use store::{DEFAULT_COLLECTION, MongoLockStore};

//! Distributed locks over a shared document store.
//!
//! Workers in different processes serialize on named resources through a
//! [`LockManager`]. The store only has to offer an atomic exclusive-lock write
//! ([`LockClient`]) and a sweep of expired records ([`Purger`]); the manager
//! adds the rest.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use distributed_lock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
//!     let store = MongoLockStore::new(&client.database("app"), None);
//!
//!     let manager = LockManagerBuilder::new("reports").build(store.clone(), store)?;
//!
//!     // Retries with jittered backoff while another worker holds it
//!     let held = manager.acquire("monthly", "worker-1").await?;
//!
//!     // Critical section - we have exclusive access
//!     println!("Doing critical work...");
//!
//!     manager.unlock(held).await?;
//!     manager.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Contention Retries**: Randomized backoff within a retry budget
//! - **Persistent Release**: Unlock keeps retrying, TTL covers what it cannot
//! - **Anti-Starvation**: Owners re-taking a resource too quickly are made to yield
//! - **Background Purge**: Expired locks are swept on a fixed period
//! - **Graceful Shutdown**: `close()` wakes every waiter and joins the purge loop
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `distributed-lock-core`: Error types and collaborator traits
//! - `distributed-lock-manager`: Lock manager, configuration and throttling
//! - `distributed-lock-mongo`: MongoDB lock store
//!
//! For fine-grained control, you can depend on individual crates instead.

// Re-export core types and traits
pub use distributed_lock_core::*;

// Re-export the manager
pub use distributed_lock_manager::*;

// Re-export mongo backend
pub use distributed_lock_mongo::*;

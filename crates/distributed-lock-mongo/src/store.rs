use std::time::Duration;

use distributed_lock_core::{
    error::{LockError, LockResult},
    traits::{LockClient, Purger},
};
use mongodb::{
    Collection, Database,
    bson::{DateTime, doc},
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
};
use tracing::{debug, instrument};

use crate::document::LockDocument;

pub const DEFAULT_COLLECTION: &str = "locks";

const DUPLICATE_KEY: i32 = 11000;

/// Lock records in a MongoDB collection.
///
/// Implements both the lock primitive and the purger, so a single store can be
/// handed to a lock manager twice:
///
/// ```rust,ignore
/// let store = MongoLockStore::new(&database, None);
/// let manager = LockManagerBuilder::new("billing").build(store.clone(), store)?;
/// ```
///
/// Expiry is always judged by the server clock (`$$NOW`), never the client's.
#[derive(Clone)]
pub struct MongoLockStore {
    collection: Collection<LockDocument>,
}

impl MongoLockStore {
    pub fn new(database: &Database, collection_name: Option<&str>) -> Self {
        let collection = database.collection(collection_name.unwrap_or(DEFAULT_COLLECTION));
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<LockDocument> {
        &self.collection
    }
}

impl LockClient for MongoLockStore {
    #[instrument(skip(self), fields(backend = "mongo"))]
    async fn xlock(&self, resource_name: &str, lock_id: &str, ttl: Duration) -> LockResult<()> {
        let ttl_ms = ttl_millis(ttl);

        // expired := ifNull(expiresAt, epoch) <= $$NOW
        let epoch = DateTime::from_millis(0);
        let expired_or_missing = doc! {
            "$lte": [
                { "$ifNull": ["$expiresAt", epoch] },
                "$$NOW"
            ]
        };

        let new_expires_at = doc! {
            "$dateAdd": {
                "startDate": "$$NOW",
                "unit": "millisecond",
                "amount": ttl_ms
            }
        };

        // Only overwrite the holder when the current one is gone
        let set_stage = doc! {
            "$set": {
                "lockId": {
                    "$cond": [&expired_or_missing, lock_id, "$lockId"]
                },
                "expiresAt": {
                    "$cond": [&expired_or_missing, &new_expires_at, "$expiresAt"]
                },
                "acquiredAt": {
                    "$cond": [&expired_or_missing, "$$NOW", "$acquiredAt"]
                }
            }
        };

        let result = self
            .collection
            .find_one_and_update(doc! { "_id": resource_name }, vec![set_stage])
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        match result {
            Ok(Some(current)) if current.lock_id == lock_id => Ok(()),
            Ok(_) => Err(LockError::AlreadyLocked(resource_name.to_string())),
            // Two upserts raced to create the record and the other one won
            Err(e) if is_duplicate_key(&e) => {
                Err(LockError::AlreadyLocked(resource_name.to_string()))
            }
            Err(e) => Err(LockError::Connection(Box::new(e))),
        }
    }

    #[instrument(skip(self), fields(backend = "mongo"))]
    async fn unlock(&self, lock_id: &str) -> LockResult<()> {
        // Nothing deleted means the lock already expired and was purged or
        // taken over; either way it is no longer ours to release.
        let result = self
            .collection
            .delete_one(doc! { "lockId": lock_id })
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;

        debug!(deleted = result.deleted_count, "released lock");
        Ok(())
    }
}

impl Purger for MongoLockStore {
    #[instrument(skip(self), fields(backend = "mongo"))]
    async fn purge(&self) -> LockResult<()> {
        let result = self
            .collection
            .delete_many(doc! { "$expr": { "$lte": ["$expiresAt", "$$NOW"] } })
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;

        debug!(purged = result.deleted_count, "purged expired locks");
        Ok(())
    }
}

/// TTL as a `$dateAdd` amount, saturating instead of wrapping negative.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        _ => false,
    }
}

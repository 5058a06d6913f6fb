use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One lock record; `_id` is the resource name, so a resource has at most one.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockDocument {
    #[serde(rename = "_id")]
    pub resource: String,

    #[serde(rename = "lockId")]
    pub lock_id: String,

    #[serde(rename = "acquiredAt")]
    pub acquired_at: DateTime,

    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime,
}

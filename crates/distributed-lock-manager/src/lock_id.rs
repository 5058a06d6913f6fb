//! Lock id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns a process-wide strictly increasing nonce derived from the Unix time
/// in nanoseconds.
///
/// Two calls in the same nanosecond still get distinct values: the nonce is
/// bumped past the previous one instead of repeating it.
pub fn next_nonce() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Name of the store record guarding `resource_id` in `namespace`.
pub fn resource_name(namespace: &str, resource_id: &str) -> String {
    format!("{namespace}-{resource_id}")
}

/// Creates a lock id unique to one acquisition of `resource_id`.
///
/// Format: `{namespace}-{resource_id}-{nonce}`
pub fn create_lock_id(namespace: &str, resource_id: &str) -> String {
    format!("{}-{}", resource_name(namespace, resource_id), next_nonce())
}

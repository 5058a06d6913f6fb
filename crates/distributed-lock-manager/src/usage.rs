//! Per-owner bookkeeping of rapid lock re-acquisition.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Usage record of one (resource, owner) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Consecutive rapid re-acquisitions.
    pub count: u32,
    /// Time of the last successful unlock, `None` if never released.
    pub released: Option<Instant>,
}

/// Outcome of [`UsageTracker::wait_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    /// The owner was not cycling fast enough to be throttled.
    NotNeeded,
    /// The owner was made to wait the full usage sleep.
    Slept,
    /// The wait was cut short by the interrupt future.
    Interrupted,
}

/// Tracks how quickly each owner re-acquires each resource and decides when an
/// owner has to yield.
///
/// Records are keyed resource id -> owner -> [`Usage`]. An inner map is dropped
/// as soon as its last entry goes, so the outer map holds no empty entries.
#[derive(Debug)]
pub struct UsageTracker {
    usages: Mutex<HashMap<String, HashMap<String, Usage>>>,
    time_threshold_since_last_release: Duration,
    usage_sleep: Duration,
    max_count: u32,
}

impl UsageTracker {
    pub fn new(
        time_threshold_since_last_release: Duration,
        usage_sleep: Duration,
        max_count: u32,
    ) -> Self {
        Self {
            usages: Mutex::new(HashMap::new()),
            time_threshold_since_last_release,
            usage_sleep,
            max_count,
        }
    }

    fn within_threshold(&self, released: Instant, now: Instant) -> bool {
        now.saturating_duration_since(released) <= self.time_threshold_since_last_release
    }

    /// Records a successful acquisition by `owner`.
    ///
    /// The counter grows while the owner keeps coming back within the release
    /// threshold (or has never released) and drops to zero otherwise.
    pub fn set_count(&self, resource_id: &str, owner: &str) {
        let now = Instant::now();
        let mut usages = self.usages.lock();
        let usage = usages
            .entry(resource_id.to_string())
            .or_default()
            .entry(owner.to_string())
            .or_insert(Usage {
                count: 0,
                released: None,
            });

        match usage.released {
            Some(released) if !self.within_threshold(released, now) => usage.count = 0,
            _ => usage.count += 1,
        }
    }

    /// Returns how long `owner` must wait before taking `resource_id`, if at all.
    pub fn throttle_delay(&self, resource_id: &str, owner: &str) -> Option<Duration> {
        let now = Instant::now();
        let usages = self.usages.lock();
        let usage = usages.get(resource_id)?.get(owner)?;
        let released = usage.released?;

        if usage.count >= self.max_count && self.within_threshold(released, now) {
            Some(self.usage_sleep)
        } else {
            None
        }
    }

    /// Blocks `owner` for the usage sleep if it has been cycling `resource_id`
    /// too fast, then resets its counter.
    ///
    /// The sleep ends early when `interrupt` completes; the counter is left
    /// untouched in that case. The internal mutex is never held while waiting.
    pub async fn wait_if_needed<F>(
        &self,
        resource_id: &str,
        owner: &str,
        interrupt: F,
    ) -> Throttle
    where
        F: Future<Output = ()>,
    {
        let Some(delay) = self.throttle_delay(resource_id, owner) else {
            return Throttle::NotNeeded;
        };

        debug!(
            lock.resource = resource_id,
            lock.owner = owner,
            delay_ms = delay.as_millis() as u64,
            "throttling owner re-acquiring too fast"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = interrupt => return Throttle::Interrupted,
        }

        if let Some(usage) = self
            .usages
            .lock()
            .get_mut(resource_id)
            .and_then(|owners| owners.get_mut(owner))
        {
            usage.count = 0;
        }
        Throttle::Slept
    }

    /// Stamps the release time on an existing record. No-op if absent.
    pub fn set_released(&self, resource_id: &str, owner: &str, released: Instant) {
        if let Some(usage) = self
            .usages
            .lock()
            .get_mut(resource_id)
            .and_then(|owners| owners.get_mut(owner))
        {
            usage.released = Some(released);
        }
    }

    /// Removes the record of `owner` on `resource_id`.
    pub fn remove(&self, resource_id: &str, owner: &str) {
        let mut usages = self.usages.lock();
        if let Some(owners) = usages.get_mut(resource_id) {
            owners.remove(owner);
            if owners.is_empty() {
                usages.remove(resource_id);
            }
        }
    }

    /// Drops every record whose last release is older than the release
    /// threshold, and records that were never released. Returns the number of
    /// records removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut usages = self.usages.lock();

        // Collect first, the map must not change while it is being walked
        let mut stale = Vec::new();
        for (resource_id, owners) in usages.iter() {
            for (owner, usage) in owners {
                let expired = match usage.released {
                    Some(released) => !self.within_threshold(released, now),
                    None => true,
                };
                if expired {
                    stale.push((resource_id.clone(), owner.clone()));
                }
            }
        }

        for (resource_id, owner) in &stale {
            if let Some(owners) = usages.get_mut(resource_id) {
                owners.remove(owner);
                if owners.is_empty() {
                    usages.remove(resource_id);
                }
            }
        }
        stale.len()
    }

    /// Returns a copy of the record of `owner` on `resource_id`.
    pub fn get(&self, resource_id: &str, owner: &str) -> Option<Usage> {
        self.usages.lock().get(resource_id)?.get(owner).copied()
    }

    /// Number of resources with at least one record.
    pub fn resource_count(&self) -> usize {
        self.usages.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    const THRESHOLD: Duration = Duration::from_millis(100);
    const SLEEP: Duration = Duration::from_millis(50);

    fn tracker(max_count: u32) -> UsageTracker {
        UsageTracker::new(THRESHOLD, SLEEP, max_count)
    }

    /// Acquire + release `times` times in quick succession.
    fn cycle(tracker: &UsageTracker, resource_id: &str, owner: &str, times: u32) {
        for _ in 0..times {
            tracker.set_count(resource_id, owner);
            tracker.set_released(resource_id, owner, Instant::now());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_count_creates_and_increments() {
        let tracker = tracker(3);
        assert!(tracker.get("orders", "worker-1").is_none());

        tracker.set_count("orders", "worker-1");
        let usage = tracker.get("orders", "worker-1").unwrap();
        assert_eq!(usage.count, 1);
        assert!(usage.released.is_none());

        // Never released: keeps counting
        tracker.set_count("orders", "worker-1");
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_count_resets_after_slow_reacquire() {
        let tracker = tracker(3);
        cycle(&tracker, "orders", "worker-1", 2);
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 2);

        tokio::time::advance(THRESHOLD + Duration::from_millis(1)).await;
        tracker.set_count("orders", "worker-1");
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_released_ignores_unknown_pair() {
        let tracker = tracker(3);
        tracker.set_released("orders", "ghost", Instant::now());
        assert!(tracker.get("orders", "ghost").is_none());
        assert_eq!(tracker.resource_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_sleeps_once_and_resets() {
        let tracker = tracker(3);
        cycle(&tracker, "orders", "worker-1", 3);

        let start = Instant::now();
        let outcome = tracker.wait_if_needed("orders", "worker-1", pending()).await;
        assert_eq!(outcome, Throttle::Slept);
        assert!(start.elapsed() >= SLEEP);
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 0);

        // Counter was reset, so no second sleep
        let start = Instant::now();
        let outcome = tracker.wait_if_needed("orders", "worker-1", pending()).await;
        assert_eq!(outcome, Throttle::NotNeeded);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_below_max_count() {
        let tracker = tracker(3);
        cycle(&tracker, "orders", "worker-1", 2);

        let start = Instant::now();
        let outcome = tracker.wait_if_needed("orders", "worker-1", pending()).await;
        assert_eq!(outcome, Throttle::NotNeeded);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_outside_threshold() {
        let tracker = tracker(3);
        cycle(&tracker, "orders", "worker-1", 5);
        tokio::time::advance(THRESHOLD + Duration::from_millis(1)).await;

        let outcome = tracker.wait_if_needed("orders", "worker-1", pending()).await;
        assert_eq!(outcome, Throttle::NotNeeded);
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_without_record_or_release() {
        let tracker = tracker(1);
        let outcome = tracker.wait_if_needed("orders", "nobody", pending()).await;
        assert_eq!(outcome, Throttle::NotNeeded);

        // Held but never released
        tracker.set_count("orders", "worker-1");
        tracker.set_count("orders", "worker-1");
        let outcome = tracker.wait_if_needed("orders", "worker-1", pending()).await;
        assert_eq!(outcome, Throttle::NotNeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_interrupted_keeps_count() {
        let tracker = tracker(2);
        cycle(&tracker, "orders", "worker-1", 2);

        let outcome = tracker
            .wait_if_needed("orders", "worker-1", std::future::ready(()))
            .await;
        assert_eq!(outcome, Throttle::Interrupted);
        assert_eq!(tracker.get("orders", "worker-1").unwrap().count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_drops_empty_resource() {
        let tracker = tracker(3);
        tracker.set_count("orders", "worker-1");
        tracker.set_count("orders", "worker-2");
        tracker.set_count("invoices", "worker-1");
        assert_eq!(tracker.resource_count(), 2);

        tracker.remove("orders", "worker-1");
        assert_eq!(tracker.resource_count(), 2);
        tracker.remove("orders", "worker-2");
        assert_eq!(tracker.resource_count(), 1);
        assert!(tracker.get("orders", "worker-2").is_none());

        // Absent pairs are a no-op
        tracker.remove("orders", "worker-2");
        tracker.remove("missing", "worker-1");
        assert_eq!(tracker.resource_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_removes_only_stale_records() {
        let tracker = tracker(3);

        // Stale: released long ago
        cycle(&tracker, "orders", "old-1", 1);
        cycle(&tracker, "invoices", "old-2", 1);
        cycle(&tracker, "reports", "old-3", 1);
        tokio::time::advance(THRESHOLD * 2).await;

        // Live: released just now
        cycle(&tracker, "orders", "fresh-1", 1);
        cycle(&tracker, "invoices", "fresh-2", 1);

        assert_eq!(tracker.purge(), 3);

        assert!(tracker.get("orders", "old-1").is_none());
        assert!(tracker.get("invoices", "old-2").is_none());
        assert!(tracker.get("reports", "old-3").is_none());
        assert!(tracker.get("orders", "fresh-1").is_some());
        assert!(tracker.get("invoices", "fresh-2").is_some());
        // "reports" lost its only owner
        assert_eq!(tracker.resource_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_never_released_records() {
        let tracker = tracker(3);
        tracker.set_count("orders", "crashed");
        cycle(&tracker, "orders", "fresh", 1);

        assert_eq!(tracker.purge(), 1);
        assert!(tracker.get("orders", "crashed").is_none());
        assert!(tracker.get("orders", "fresh").is_some());
    }
}

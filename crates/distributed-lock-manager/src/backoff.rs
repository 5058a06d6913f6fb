//! Randomized backoff between retries.

use std::time::Duration;

use rand::Rng;

/// Source of the delay slept between two retries.
///
/// The manager only ever asks for an interval within `[min, max]`; swapping the
/// implementation changes how the interval is picked, never the bounds.
pub trait Jitter: Send + Sync {
    /// Picks a delay in `[min, max]`.
    fn sample(&self, min: Duration, max: Duration) -> Duration;
}

/// Draws delays uniformly from `[min, max]`.
///
/// Spreading retries over the whole window keeps contending callers from
/// retrying in lockstep.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl Jitter for UniformJitter {
    fn sample(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Always returns the same delay, clamped into `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub Duration);

impl Jitter for FixedJitter {
    fn sample(&self, min: Duration, max: Duration) -> Duration {
        self.0.clamp(min, max.max(min))
    }
}

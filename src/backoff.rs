use std::time::Duration;

use rand::{Rng, RngCore};

/// Bounded exponential backoff for transient sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay before retry `attempt` (1-based): base, 2*base, 4*base, ... capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let factor = 1u32 << shift;
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }

    pub fn jittered(&self, rng: &mut impl RngCore, attempt: u32) -> Duration {
        jittered_backoff(rng, self.delay_for(attempt))
    }
}

/// Equal jitter: the delay lands in [backoff/2, backoff].
pub fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
    let backoff_ms = backoff.as_millis() as u64;
    if backoff_ms <= 1 {
        return backoff;
    }
    let half_ms = backoff_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

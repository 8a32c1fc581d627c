// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Retry backoff for delivery attempts.
//
// Exponential backoff with a deterministic jitter spread so that several
// printers retrying at once do not hammer the network in lockstep.

use std::time::Duration;

/// Backoff configuration for transport retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay to sleep after the `attempt`-th failed attempt (1-based).
    ///
    /// delay = min(base * 2^(attempt-1) + jitter, max_delay)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let shift = attempt.saturating_sub(1).min(10);
        let exp_ms = base_ms.saturating_mul(1u64 << shift);
        let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
        Duration::from_millis(total_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Deterministic jitter in [0, base) derived from the attempt number.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

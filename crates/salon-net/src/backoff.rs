//! Reconnect delay policy.
//!
//! Delays double from a base up to a cap, with random jitter so a fleet of
//! clients does not reconnect in lockstep after a server-side outage.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with +/-50% jitter.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Delay to wait before the next connection attempt.
    pub fn next_delay(&mut self) -> Duration {
        // 2^7 * base already exceeds any sane cap
        let factor = 1u32 << self.attempt.min(7);
        self.attempt = self.attempt.saturating_add(1);

        let raw = self.base.saturating_mul(factor).min(self.cap);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(raw.as_secs_f64() * jitter)
    }

    /// Forget accumulated failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

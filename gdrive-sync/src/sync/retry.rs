use std::time::Duration;

use gdrive_core::DriveError;
use rand::Rng;

use crate::config::SyncConfig;

/// Errors that can ask for another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Wait requested by the server, if it named one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for DriveError {
    fn is_retryable(&self) -> bool {
        DriveError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        DriveError::retry_after(self)
    }
}

/// How many times a Drive call is attempted and how long to wait between
/// attempts.
///
/// The wait doubles from `base_delay` up to `max_delay`, then a random
/// point in its upper half is picked so parallel clients drift apart.
/// A `Retry-After` from the server replaces the computed wait, still capped
/// at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.fetch_attempts,
            config.retry_base_delay,
            config.retry_max_delay,
        )
    }

    /// Retries without sleeping.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait before the next attempt after `failed` attempts ended in `err`,
    /// or `None` when the error is final.
    pub fn next_delay<E: Retryable>(&self, failed: u32, err: &E) -> Option<Duration> {
        if !err.is_retryable() || failed >= self.attempts {
            return None;
        }
        let delay = match err.retry_after() {
            Some(requested) => requested.min(self.max_delay),
            None => self.spread(self.ceiling(failed), &mut rand::thread_rng()),
        };
        Some(delay)
    }

    fn ceiling(&self, failed: u32) -> Duration {
        let doublings = failed.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    fn spread<R: Rng + ?Sized>(&self, ceiling: Duration, rng: &mut R) -> Duration {
        let half = ceiling / 2;
        let extra = rng.gen_range(0..=(ceiling - half).as_millis() as u64);
        half + Duration::from_millis(extra)
    }
}

//! Push retry policy: exponential backoff with an attempt cap.

use std::time::Duration;

use crate::models::Record;

/// How the engine treats records whose previous pushes failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which a record is stalled; `None` never stalls
    pub max_attempts: Option<u32>,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for the doubling delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// What a pass should do with one unsynced record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Push,
    /// Backoff window still open
    Deferred,
    /// Attempt cap reached; only a manual retry re-queues it
    Stalled,
}

impl RetryPolicy {
    /// Retry every pass with no delay and no cap
    pub const fn immediate() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff after the `attempts`-th consecutive failure:
    /// `min(base * 2^(attempts - 1), max)`
    pub fn delay_after(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.checked_pow(attempts - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Unix ms at which a record that has failed `attempts` times may be
    /// pushed again, or `None` when it may go out on the next pass
    pub fn next_attempt_at(&self, attempts: u32, now_ms: i64) -> Option<i64> {
        let delay = self.delay_after(attempts);
        if delay.is_zero() {
            return None;
        }
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Some(now_ms.saturating_add(delay_ms))
    }

    pub fn is_stalled(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    pub fn classify<P>(&self, record: &Record<P>, now_ms: i64) -> Attempt {
        if self.is_stalled(record.sync_attempts) {
            Attempt::Stalled
        } else if record.next_attempt_at.is_some_and(|at| at > now_ms) {
            Attempt::Deferred
        } else {
            Attempt::Push
        }
    }
}

//! # Retry Policy
//!
//! Exponential backoff for failed pushes, with a give-up threshold.
//!
//! ## Backoff Schedule (defaults)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  delay(attempt) = min(base * 2^attempt, max)                            │
//! │                                                                         │
//! │  attempt  0 → 1s                                                        │
//! │  attempt  1 → 2s                                                        │
//! │  attempt  2 → 4s                                                        │
//! │  ...                                                                    │
//! │  attempt  8 → 256s                                                      │
//! │  attempt  9 → 300s (capped)                                             │
//! │                                                                         │
//! │  After 10 failed attempts the item is no longer retried automatically. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default delay before the first retry (milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default upper bound on any single delay (milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 300_000;

/// Default number of failed attempts after which an item is given up.
pub const DEFAULT_GIVE_UP_AFTER: u32 = 10;

/// Deterministic exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub give_up_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            give_up_after: DEFAULT_GIVE_UP_AFTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy from millisecond values.
    pub fn from_millis(base_delay_ms: u64, max_delay_ms: u64, give_up_after: u32) -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            give_up_after,
        }
    }

    /// Delay to wait before attempt number `attempt` (zero-based).
    ///
    /// Saturates at `max_delay` instead of overflowing.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let delay_ms = 2u64
            .checked_pow(attempt)
            .and_then(|factor| base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);

        Duration::from_millis(delay_ms.min(max_ms))
    }

    /// Returns true while an item with `retry_count` failures may be retried.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.give_up_after
    }

    /// Returns true if an item is allowed to be sent at `now`.
    ///
    /// Never-attempted items are always due. Failed items are due once
    /// their backoff window has elapsed and they are under the threshold.
    pub fn is_due(
        &self,
        retry_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last_attempt_at) = last_attempt_at else {
            return true;
        };

        if !self.should_retry(retry_count) {
            return false;
        }

        // A clock that moved backwards yields a negative span: not due yet.
        match (now - last_attempt_at).to_std() {
            Ok(elapsed) => elapsed >= self.next_delay(retry_count),
            Err(_) => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_table() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(0), Duration::from_millis(1_000));
        assert_eq!(policy.next_delay(1), Duration::from_millis(2_000));
        assert_eq!(policy.next_delay(2), Duration::from_millis(4_000));
        assert_eq!(policy.next_delay(8), Duration::from_millis(256_000));
        assert_eq!(policy.next_delay(9), Duration::from_millis(300_000));
        assert_eq!(policy.next_delay(10), Duration::from_millis(300_000));
    }

    #[test]
    fn test_delay_formula_holds_for_all_small_attempts() {
        let policy = RetryPolicy::default();
        for attempt in 0..=40u32 {
            let expected = (1_000u64 << attempt).min(300_000);
            assert_eq!(policy.next_delay(attempt), Duration::from_millis(expected));
        }
    }

    #[test]
    fn test_delay_saturates_on_huge_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(64), Duration::from_millis(300_000));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_millis(300_000));
    }

    #[test]
    fn test_give_up_threshold() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(9));
        assert!(!policy.should_retry(10));
        assert!(!policy.should_retry(11));
    }

    #[test]
    fn test_is_due() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        // Fresh items are always due
        assert!(policy.is_due(0, None, now));

        // One failure → wait next_delay(1) = 2s
        let failed_at = now - chrono::Duration::milliseconds(1_500);
        assert!(!policy.is_due(1, Some(failed_at), now));
        let failed_at = now - chrono::Duration::milliseconds(2_000);
        assert!(policy.is_due(1, Some(failed_at), now));

        // Exhausted items are never due
        let long_ago = now - chrono::Duration::days(1);
        assert!(!policy.is_due(10, Some(long_ago), now));

        // Clock skew: last attempt in the future
        let future = now + chrono::Duration::seconds(30);
        assert!(!policy.is_due(1, Some(future), now));
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy::from_millis(10, 50, 3);
        assert_eq!(policy.next_delay(0), Duration::from_millis(10));
        assert_eq!(policy.next_delay(3), Duration::from_millis(50));
        assert!(!policy.should_retry(3));
    }
}

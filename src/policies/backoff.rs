//! # Backoff policy for restarting processes.
//!
//! [`BackoffPolicy`] controls how the delay between attempts grows.
//! The delay before retry `n` (1-based) is `first × 2^(n-1)`, clamped to `max`:
//!
//! ```text
//! first = 1s, max = 30s
//! retry:  1    2    3    4    5     6     7 ...
//! delay:  1s   2s   4s   8s   16s   30s   30s
//! ```
//!
//! The base is derived purely from the retry number, so the sequence is monotonically
//! non-decreasing and never exceeds `max`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(10));
//!
//! assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max = 10s
//! assert_eq!(backoff.delay_for(11), Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Delay cap.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `max = 30s`.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl BackoffPolicy {
    /// Doubling backoff from `first`, capped at `max`.
    pub fn new(first: Duration, max: Duration) -> Self {
        Self { first, max }
    }

    /// Delay before retry number `retry` (1-based; `0` is treated as `1`).
    ///
    /// # Notes
    /// - The cap also applies to the first retry, so `first > max` yields `max`.
    /// - Overflowing intermediate values fall back to `max`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1);
        1u32.checked_shl(exp)
            .and_then(|mult| self.first.checked_mul(mult))
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(first_ms), Duration::from_millis(max_ms))
    }

    #[test]
    fn first_retry_uses_base_delay() {
        assert_eq!(policy(500, 30_000).delay_for(1), Duration::from_millis(500));
        assert_eq!(policy(500, 30_000).delay_for(0), Duration::from_millis(500));
    }

    #[test]
    fn doubles_until_cap() {
        let p = policy(1_000, 30_000);
        let seq: Vec<u64> = (1..=7).map(|n| p.delay_for(n).as_millis() as u64).collect();
        assert_eq!(seq, [1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn sequence_is_monotonic_and_bounded() {
        let p = policy(300, 7_000);
        let mut prev = Duration::ZERO;
        for n in 1..64 {
            let d = p.delay_for(n);
            assert!(d >= prev);
            assert!(d <= p.max);
            prev = d;
        }
    }

    #[test]
    fn huge_retry_number_does_not_overflow() {
        assert_eq!(policy(1_000, 30_000).delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn base_larger_than_cap_is_clamped() {
        assert_eq!(policy(60_000, 30_000).delay_for(1), Duration::from_secs(30));
    }

    #[test]
    fn growth_is_exact_doubling() {
        let p = policy(250, 10_000_000);
        assert_eq!(p.delay_for(5), Duration::from_millis(250 * 16));
        assert_eq!(p.delay_for(32), Duration::from_millis(10_000_000));
    }
}

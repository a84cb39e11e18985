//! Fixed-interval redelivery policy.

use std::time::Duration;

/// How many times and how often the adapter retries a transient delivery
/// failure before surfacing [`crate::BusError::DeliveryFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first.
    pub attempts: u32,
    /// Fixed spacing between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 5-second spacing.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

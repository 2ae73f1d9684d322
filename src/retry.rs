//! Bounded retry policy for vendor cloud calls
//!
//! The refresh cycle retries a fetch at most once after a silent re-login.
//! The policy is an explicit value so attempt loops stay free of manual
//! break/continue bookkeeping.

use crate::error::LandauError;

/// Retryable-error predicate
pub type RetryPredicate = fn(&LandauError) -> bool;

/// Bounded retry policy: a maximum attempt count plus a predicate deciding
/// which errors are worth another attempt.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    /// Create a new policy
    pub fn new(max_attempts: u32, retryable: RetryPredicate) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retryable,
        }
    }

    /// Stock policy for authenticated fetches: two attempts, retry only on
    /// HTTP 401
    pub fn unauthorized_once() -> Self {
        Self::new(2, |err| err.is_unauthorized())
    }

    /// Total number of attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt numbers, starting at 1
    pub fn attempts(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.max_attempts
    }

    /// Whether `err` on attempt number `attempt` warrants another try
    pub fn should_retry(&self, attempt: u32, err: &LandauError) -> bool {
        attempt < self.max_attempts && (self.retryable)(err)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

//! Retry policy and response classification for network operations.

use reqwest::StatusCode;
use std::time::Duration;

/// Retries after the first attempt of a single request.
pub const MAX_RETRIES: usize = 3;

/// Total attempts for a single request: the first one plus every retry.
pub const MAX_ATTEMPTS: usize = MAX_RETRIES + 1;

/// Delay before the second attempt, in milliseconds. Doubles on every retry.
pub const RETRY_DELAY_MS: u64 = 500;

/// Upper bound for the backoff delay, in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy allowing `retries` attempts after the first one.
    pub fn with_retries(retries: usize) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS).max(base_delay),
        }
    }

    /// A policy that retries without sleeping. Handy in tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// What to do with a response that made it back from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 2xx: hand the body to the caller, never retry.
    Accept,
    /// 5xx: the server may recover, try again.
    Retry,
    /// 4xx: the request itself is at fault, fail immediately.
    Reject,
    /// 1xx or 3xx that reqwest did not resolve on its own. Not retried.
    Unexpected,
}

pub fn classify_status(status: StatusCode) -> Disposition {
    if status.is_success() {
        Disposition::Accept
    } else if status.is_server_error() {
        Disposition::Retry
    } else if status.is_client_error() {
        Disposition::Reject
    } else {
        Disposition::Unexpected
    }
}

/// Returns true if a send error is worth another attempt.
///
/// Connection failures, DNS failures and timeouts are transient. A builder
/// error means the request could never be sent and retrying will not help.
pub fn is_transient(error: &reqwest::Error) -> bool {
    !error.is_builder()
}

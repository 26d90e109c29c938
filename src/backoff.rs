//! Exponential backoff with additive jitter.
//!
//! [`RetryPolicy`] controls how many times a failed generation is restarted
//! and how long to wait in between. Delays grow as `base * 2^attempt` with up
//! to 30% random jitter on top, capped at `max_delay`, so that many callers
//! failing together do not retry in lockstep.

use std::time::Duration;

use crate::error::{Result, StreamError};

/// Share of the exponential delay added as random jitter.
const JITTER_FRACTION: f64 = 0.3;

/// Retry configuration for the streaming client.
///
/// # Example
///
/// ```
/// use llm_resilience::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries, 4);
/// assert_eq!(policy.total_attempts(), 5);
///
/// let fast = RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(5)).unwrap();
/// assert_eq!(fast.total_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Default: 4.
    pub max_retries: u32,

    /// Delay before the first retry. Default: 1 second.
    pub base_delay: Duration,

    /// Upper bound for any single delay. Default: 30 seconds.
    pub max_delay: Duration,

    /// Whether a provider `Retry-After` hint may lengthen the delay.
    /// Default: `true`.
    pub respect_retry_after: bool,
}

impl RetryPolicy {
    /// Build a policy, rejecting a zero base delay or `max_delay < base_delay`.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if base_delay.is_zero() {
            return Err(StreamError::InvalidConfig(
                "retry base delay must be positive".into(),
            ));
        }
        if max_delay < base_delay {
            return Err(StreamError::InvalidConfig(format!(
                "retry max delay ({}ms) must not be below base delay ({}ms)",
                max_delay.as_millis(),
                base_delay.as_millis()
            )));
        }
        Ok(Self {
            max_retries,
            base_delay,
            max_delay,
            respect_retry_after: true,
        })
    }

    /// No retries at all: one attempt, failures surface immediately.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Ignore provider `Retry-After` hints.
    pub fn ignoring_retry_after(mut self) -> Self {
        self.respect_retry_after = false;
        self
    }

    /// Initial attempt plus retries.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Jittered delay before retry number `attempt + 1` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.max_delay)
    }

    /// Delay to sleep after a failure, honouring a `Retry-After` hint.
    ///
    /// The hint can only lengthen the computed delay, never beyond `max_delay`.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) if self.respect_retry_after => computed.max(hint.min(self.max_delay)),
            _ => computed,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            respect_retry_after: true,
        }
    }
}

/// Backoff delay for `attempt` (0-indexed).
///
/// Always within `[base * 2^attempt, base * 2^attempt * 1.3]`, capped at
/// `max_delay`.
pub fn backoff_delay(attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    delay_with_sample(attempt, base_delay, max_delay, fastrand::f64())
}

/// Same as [`backoff_delay`] with the random sample supplied (`0.0..=1.0`).
fn delay_with_sample(attempt: u32, base_delay: Duration, max_delay: Duration, sample: f64) -> Duration {
    let cap = max_delay.as_nanos();
    let factor = 1u128.checked_shl(attempt).unwrap_or(u128::MAX);
    let exponential = base_delay.as_nanos().saturating_mul(factor);
    if exponential >= cap {
        return max_delay;
    }

    let jitter = (exponential as f64 * JITTER_FRACTION * sample.clamp(0.0, 1.0)) as u128;
    let total = exponential.saturating_add(jitter).min(cap);
    Duration::from_nanos(u64::try_from(total).unwrap_or(u64::MAX))
}

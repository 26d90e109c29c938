//! Hard deadlines around a single asynchronous operation.
//!
//! [`with_timeout`] races a future against a deadline. The deadline timer is
//! owned by the returned future, so it is dropped together with whichever
//! side loses the race.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A deadline enforced by this crate expired.
///
/// Carries the configured duration and a label naming the phase
/// (`"connect"`, `"request"`, `"first-fragment"`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{label} timeout: operation did not complete within {ms}ms", ms = .duration.as_millis())]
pub struct TimeoutError {
    /// Which phase timed out.
    pub label: String,
    /// The configured deadline.
    pub duration: Duration,
}

impl TimeoutError {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }
}

/// The four independent deadlines of a streaming call.
///
/// | Field                    | Governs                                   | Default |
/// |--------------------------|-------------------------------------------|---------|
/// | `connection_timeout`     | opening the provider stream               | 15 s    |
/// | `request_timeout`        | total duration of one attempt             | 120 s   |
/// | `first_fragment_timeout` | time from connection to first fragment    | 45 s    |
/// | `heartbeat_interval`     | stall warnings between fragments          | 10 s    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
    pub first_fragment_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl TimeoutPolicy {
    /// Build a policy, rejecting zero durations.
    pub fn new(
        connection_timeout: Duration,
        request_timeout: Duration,
        first_fragment_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> crate::error::Result<Self> {
        let named = [
            ("connection timeout", connection_timeout),
            ("request timeout", request_timeout),
            ("first-fragment timeout", first_fragment_timeout),
            ("heartbeat interval", heartbeat_interval),
        ];
        if let Some((name, _)) = named.iter().find(|(_, d)| d.is_zero()) {
            return Err(crate::error::StreamError::InvalidConfig(format!(
                "{} must be positive",
                name
            )));
        }
        Ok(Self {
            connection_timeout,
            request_timeout,
            first_fragment_timeout,
            heartbeat_interval,
        })
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_millis(15_000),
            request_timeout: Duration::from_millis(120_000),
            first_fragment_timeout: Duration::from_millis(45_000),
            heartbeat_interval: Duration::from_millis(10_000),
        }
    }
}

/// Run `operation`, failing with [`TimeoutError`] if it does not settle
/// within `timeout`.
///
/// Whatever `operation` produces (including its own error) is returned
/// unchanged inside `Ok`.
///
/// # Example
///
/// ```
/// use llm_resilience::timeout::with_timeout;
/// use std::time::Duration;
///
/// # #[tokio::main] async fn main() {
/// let value = with_timeout(async { 42 }, Duration::from_secs(1), "answer").await;
/// assert_eq!(value, Ok(42));
/// # }
/// ```
pub async fn with_timeout<F>(
    operation: F,
    timeout: Duration,
    label: &str,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| TimeoutError::new(label, timeout))
}

//! Structured events for retries, timeouts, heartbeats, and completion.
//!
//! The streaming client reports everything it does through a single
//! [`EventHandler::on_event`] call with a tagged [`Event`]. The default
//! handler, [`TracingEventHandler`], forwards events to `tracing`; tests and
//! UIs can plug in their own with [`FnEventHandler`].

use std::sync::Arc;
use std::time::Duration;

use crate::attempt::Attempt;
use crate::classify::ErrorCategory;

/// Events emitted during one logical streaming call.
#[derive(Debug, Clone)]
pub enum Event {
    /// An attempt is starting.
    AttemptStart {
        /// 0-based attempt index.
        attempt: u32,
        /// Total attempts the policy allows.
        max_attempts: u32,
    },
    /// The provider accepted the connection.
    Connected {
        attempt: u32,
        /// Time spent establishing the connection.
        elapsed: Duration,
    },
    /// The first fragment of an attempt arrived.
    FirstFragment {
        attempt: u32,
        /// Time since the connection was ready.
        since_connected: Duration,
        /// Time since the logical call started.
        since_call_start: Duration,
    },
    /// No fragment arrived before the first-fragment deadline.
    FirstFragmentTimeout {
        attempt: u32,
        /// The configured deadline.
        timeout: Duration,
    },
    /// The stream has been silent for longer than the heartbeat interval.
    HeartbeatWarning {
        attempt: u32,
        /// Time since the last fragment.
        since_last_fragment: Duration,
        /// The configured heartbeat interval.
        threshold: Duration,
    },
    /// A retryable failure; the client will sleep and try again.
    Retry {
        /// 1-based number of the retry about to happen.
        retry: u32,
        /// Retries the policy allows.
        max_retries: u32,
        /// Category of the failure.
        category: ErrorCategory,
        /// Delay before the next attempt.
        delay: Duration,
        /// Raw failure description.
        reason: String,
    },
    /// An attempt ended, whatever the outcome.
    AttemptEnd(Attempt),
    /// The call finished successfully.
    Completed {
        /// Attempts used, initial call included.
        attempts: u32,
        /// Fragments yielded by the successful attempt.
        fragments: u32,
        /// Wall-clock duration of the whole call.
        total: Duration,
    },
    /// The call failed for good.
    Failed {
        attempts: u32,
        category: ErrorCategory,
        /// Whether the failure was retryable (retries exhausted).
        exhausted: bool,
        /// Raw failure description.
        reason: String,
    },
    /// The caller cancelled the call.
    Cancelled {
        /// Attempt in progress (or about to start) when cancellation was seen.
        attempt: u32,
    },
}

/// Receiver for streaming-client events.
///
/// # Example
///
/// ```
/// use llm_resilience::events::{Event, EventHandler};
///
/// struct RetryPrinter;
///
/// impl EventHandler for RetryPrinter {
///     fn on_event(&self, event: Event) {
///         if let Event::Retry { retry, delay, reason, .. } = event {
///             println!("retry {} in {:?}: {}", retry, delay, reason);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for every event, synchronously, from the streaming task.
    fn on_event(&self, event: Event);
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use llm_resilience::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::HeartbeatWarning { since_last_fragment, .. } = event {
///         eprintln!("stream quiet for {:?}", since_last_fragment);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Forwards events to `tracing`. The streaming client's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn on_event(&self, event: Event) {
        match event {
            Event::AttemptStart {
                attempt,
                max_attempts,
            } => {
                tracing::debug!(attempt = attempt + 1, max_attempts, "starting generation attempt");
            }
            Event::Connected { attempt, elapsed } => {
                tracing::debug!(
                    attempt = attempt + 1,
                    connect_ms = elapsed.as_millis() as u64,
                    "provider connection established"
                );
            }
            Event::FirstFragment {
                attempt,
                since_connected,
                since_call_start,
            } => {
                tracing::info!(
                    attempt = attempt + 1,
                    ttff_ms = since_connected.as_millis() as u64,
                    ttff_total_ms = since_call_start.as_millis() as u64,
                    "first fragment received"
                );
            }
            Event::FirstFragmentTimeout { attempt, timeout } => {
                tracing::warn!(
                    attempt = attempt + 1,
                    timeout_ms = timeout.as_millis() as u64,
                    "no first fragment within deadline"
                );
            }
            Event::HeartbeatWarning {
                attempt,
                since_last_fragment,
                threshold,
            } => {
                tracing::warn!(
                    attempt = attempt + 1,
                    silent_ms = since_last_fragment.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "stream heartbeat warning"
                );
            }
            Event::Retry {
                retry,
                max_retries,
                category,
                delay,
                reason,
            } => {
                tracing::warn!(
                    retry,
                    max_retries,
                    category = category.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "retrying generation after transient failure"
                );
            }
            Event::AttemptEnd(record) => {
                tracing::debug!(
                    attempt = record.index + 1,
                    outcome = ?record.outcome,
                    fragments = record.fragment_count,
                    duration_ms = record.duration().as_millis() as u64,
                    "attempt finished"
                );
            }
            Event::Completed {
                attempts,
                fragments,
                total,
            } => {
                tracing::info!(
                    attempts,
                    fragments,
                    total_ms = total.as_millis() as u64,
                    "generation completed"
                );
            }
            Event::Failed {
                attempts,
                category,
                exhausted,
                reason,
            } => {
                tracing::error!(
                    attempts,
                    category = category.as_str(),
                    exhausted,
                    error = %reason,
                    "generation failed"
                );
            }
            Event::Cancelled { attempt } => {
                tracing::info!(attempt = attempt + 1, "generation cancelled by caller");
            }
        }
    }
}

/// Shared handle to an event handler.
pub type SharedEventHandler = Arc<dyn EventHandler>;

/// Emit an event through `handler`.
pub(crate) fn emit(handler: &SharedEventHandler, event: Event) {
    handler.on_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: SharedEventHandler = Arc::new(FnEventHandler(move |event: Event| {
            sink.lock().unwrap().push(event);
        }));

        emit(&handler, Event::Cancelled { attempt: 0 });
        emit(
            &handler,
            Event::Completed {
                attempts: 1,
                fragments: 3,
                total: Duration::from_millis(20),
            },
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Event::Cancelled { attempt: 0 }));
        assert!(matches!(seen[1], Event::Completed { fragments: 3, .. }));
    }

    #[test]
    fn test_tracing_handler_accepts_every_event() {
        let handler = TracingEventHandler;
        handler.on_event(Event::AttemptStart {
            attempt: 0,
            max_attempts: 3,
        });
        handler.on_event(Event::Retry {
            retry: 1,
            max_retries: 2,
            category: ErrorCategory::Overloaded,
            delay: Duration::from_millis(100),
            reason: "HTTP 503".into(),
        });
        handler.on_event(Event::Failed {
            attempts: 3,
            category: ErrorCategory::Overloaded,
            exhausted: true,
            reason: "HTTP 503".into(),
        });
    }
}

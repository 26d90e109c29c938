//! Resilient streaming client.
//!
//! [`StreamingClient::stream`] opens a streamed generation through a
//! [`Backend`] and forwards fragments to the caller as they arrive. Each
//! attempt runs under four deadlines:
//!
//! - `connection_timeout` around [`Backend::open_stream`],
//! - `request_timeout` around the whole attempt,
//! - `first_fragment_timeout` and `heartbeat_interval` through [`monitor`].
//!
//! A retryable failure at any point, before or during streaming, restarts
//! the whole generation after a backoff sleep. Fragments already yielded are
//! not revoked; every [`Fragment`] carries the attempt that produced it so
//! the caller can reset its buffer when a new attempt begins.
//!
//! Cancellation is observed before each attempt, while connecting, between
//! fragments, and during the backoff sleep. It ends the call with
//! [`StreamError::Cancelled`] and is never retried.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::attempt::{Attempt, AttemptOutcome};
use crate::backend::{Backend, GenerateRequest};
use crate::backoff::RetryPolicy;
use crate::classify::ClassifiedError;
use crate::config::ClientConfig;
use crate::error::{ProviderError, StreamError};
use crate::events::{emit, Event, SharedEventHandler, TracingEventHandler};
use crate::monitor::{monitor, MonitorOptions};
use crate::timeout::{with_timeout, TimeoutError, TimeoutPolicy};
use crate::translate::translate;

/// One fragment of a streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// 0-based attempt that produced this fragment.
    pub attempt: u32,
    /// Position within that attempt, starting at 0.
    pub index: u32,
    /// Provider chunk, passed through untouched.
    pub payload: Value,
}

/// Stream returned by [`StreamingClient::stream`].
pub type GenerationStream = BoxStream<'static, Result<Fragment, StreamError>>;

/// Streaming client with timeouts, retries, and cancellation.
///
/// Cheap to clone; clones share the backend and event handler.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use llm_resilience::{CancellationToken, GeminiBackend, GenerateRequest, StreamingClient};
///
/// # async fn example() -> Result<(), llm_resilience::StreamError> {
/// let client = StreamingClient::builder(Arc::new(GeminiBackend::new("key")))
///     .context("Resume generation")
///     .build();
///
/// let request = GenerateRequest::new("gemini-2.5-pro", "Tailor this resume...");
/// let mut stream = client.stream(request, CancellationToken::new());
/// while let Some(fragment) = stream.next().await {
///     let fragment = fragment?;
///     println!("{}", fragment.payload);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamingClient {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    timeouts: TimeoutPolicy,
    events: SharedEventHandler,
    context: String,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .field("context", &self.context)
            .finish()
    }
}

/// How one attempt ended.
enum AttemptResult {
    Completed,
    Cancelled,
    Failed(ProviderError),
}

/// What woke the attempt up.
enum Step<T> {
    Cancelled,
    Deadline,
    Ready(T),
}

impl StreamingClient {
    /// Client with default policies and tracing-based events.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn Backend>) -> StreamingClientBuilder {
        StreamingClientBuilder {
            backend,
            retry: RetryPolicy::default(),
            timeouts: TimeoutPolicy::default(),
            events: None,
            context: String::new(),
        }
    }

    /// Client using the policies from a loaded [`ClientConfig`].
    pub fn from_config(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self::builder(backend)
            .retry(config.retry.clone())
            .timeouts(config.timeouts.clone())
            .build()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout_policy(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Stream a generation for `request`.
    ///
    /// The returned stream yields fragments in order and ends after the
    /// first attempt that completes. It fails at most once, with
    /// [`StreamError::Cancelled`], [`StreamError::Terminal`] or
    /// [`StreamError::RetryExhausted`], and ends right after.
    pub fn stream(&self, request: GenerateRequest, cancel: CancellationToken) -> GenerationStream {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let timeouts = self.timeouts.clone();
        let events = Arc::clone(&self.events);
        let context = self.context.clone();

        let stream = async_stream::stream! {
            let call_started = Instant::now();
            let max_attempts = retry.total_attempts();
            let mut attempt_index: u32 = 0;

            loop {
                if cancel.is_cancelled() {
                    emit(&events, Event::Cancelled { attempt: attempt_index });
                    yield Err(StreamError::Cancelled);
                    return;
                }

                let mut attempt = Attempt::begin(attempt_index);
                emit(&events, Event::AttemptStart { attempt: attempt_index, max_attempts });

                let deadline = tokio::time::sleep(timeouts.request_timeout);
                tokio::pin!(deadline);
                let request_timeout = || {
                    ProviderError::from(TimeoutError::new("request", timeouts.request_timeout))
                };

                let result = 'attempt: {
                    let connect = with_timeout(
                        backend.open_stream(&request),
                        timeouts.connection_timeout,
                        "connect",
                    );
                    let step = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Cancelled,
                        _ = &mut deadline => Step::Deadline,
                        opened = connect => Step::Ready(opened),
                    };
                    let upstream = match step {
                        Step::Cancelled => break 'attempt AttemptResult::Cancelled,
                        Step::Deadline => break 'attempt AttemptResult::Failed(request_timeout()),
                        Step::Ready(Err(timeout)) => break 'attempt AttemptResult::Failed(timeout.into()),
                        Step::Ready(Ok(Err(e))) => break 'attempt AttemptResult::Failed(e),
                        Step::Ready(Ok(Ok(upstream))) => upstream,
                    };

                    let elapsed = attempt.mark_connected();
                    emit(&events, Event::Connected { attempt: attempt_index, elapsed });

                    let on_timeout = Arc::clone(&events);
                    let on_stall = Arc::clone(&events);
                    let idx = attempt_index;
                    let heartbeat = timeouts.heartbeat_interval;
                    let options = MonitorOptions::new(timeouts.first_fragment_timeout)
                        .with_heartbeat(heartbeat)
                        .on_timeout(move |timeout| {
                            emit(&on_timeout, Event::FirstFragmentTimeout { attempt: idx, timeout });
                        })
                        .on_heartbeat_warning(move |since_last_fragment| {
                            emit(
                                &on_stall,
                                Event::HeartbeatWarning {
                                    attempt: idx,
                                    since_last_fragment,
                                    threshold: heartbeat,
                                },
                            );
                        });
                    let mut monitored = monitor(upstream, options);

                    loop {
                        let step = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Step::Cancelled,
                            _ = &mut deadline => Step::Deadline,
                            item = monitored.next() => Step::Ready(item),
                        };
                        let payload = match step {
                            Step::Cancelled => break 'attempt AttemptResult::Cancelled,
                            Step::Deadline => break 'attempt AttemptResult::Failed(request_timeout()),
                            Step::Ready(None) => break 'attempt AttemptResult::Completed,
                            Step::Ready(Some(Err(e))) => break 'attempt AttemptResult::Failed(e),
                            Step::Ready(Some(Ok(payload))) => payload,
                        };

                        if cancel.is_cancelled() {
                            break 'attempt AttemptResult::Cancelled;
                        }
                        if attempt.fragment_count == 0 {
                            let since_connected = attempt.mark_first_fragment();
                            emit(
                                &events,
                                Event::FirstFragment {
                                    attempt: attempt_index,
                                    since_connected,
                                    since_call_start: call_started.elapsed(),
                                },
                            );
                        }
                        let fragment = Fragment {
                            attempt: attempt_index,
                            index: attempt.fragment_count,
                            payload,
                        };
                        attempt.fragment_count += 1;
                        yield Ok(fragment);
                    }
                };

                let attempts_made = attempt_index + 1;
                match result {
                    AttemptResult::Completed => {
                        attempt.finish(AttemptOutcome::Success);
                        let fragments = attempt.fragment_count;
                        emit(&events, Event::AttemptEnd(attempt));
                        emit(
                            &events,
                            Event::Completed {
                                attempts: attempts_made,
                                fragments,
                                total: call_started.elapsed(),
                            },
                        );
                        return;
                    }
                    AttemptResult::Cancelled => {
                        attempt.finish(AttemptOutcome::Cancelled);
                        emit(&events, Event::AttemptEnd(attempt));
                        emit(&events, Event::Cancelled { attempt: attempt_index });
                        yield Err(StreamError::Cancelled);
                        return;
                    }
                    AttemptResult::Failed(cause) => {
                        let classified = ClassifiedError::new(cause);
                        let category = classified.category;

                        if !classified.is_retryable || attempts_made >= max_attempts {
                            let outcome = if classified.is_retryable {
                                AttemptOutcome::RetryableFailure
                            } else {
                                AttemptOutcome::TerminalFailure
                            };
                            attempt.finish(outcome);
                            emit(&events, Event::AttemptEnd(attempt));

                            let message = translate(&classified, &context);
                            emit(
                                &events,
                                Event::Failed {
                                    attempts: attempts_made,
                                    category,
                                    exhausted: classified.is_retryable,
                                    reason: classified.message.clone(),
                                },
                            );
                            let error = if classified.is_retryable {
                                StreamError::RetryExhausted {
                                    category,
                                    attempts: attempts_made,
                                    message,
                                    source: classified.cause,
                                }
                            } else {
                                StreamError::Terminal {
                                    category,
                                    message,
                                    source: classified.cause,
                                }
                            };
                            yield Err(error);
                            return;
                        }

                        attempt.finish(AttemptOutcome::RetryableFailure);
                        emit(&events, Event::AttemptEnd(attempt));

                        let delay = retry.delay_with_hint(attempt_index, classified.cause.retry_after());
                        emit(
                            &events,
                            Event::Retry {
                                retry: attempts_made,
                                max_retries: retry.max_retries,
                                category,
                                delay,
                                reason: classified.message,
                            },
                        );

                        let slept = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => false,
                            _ = tokio::time::sleep(delay) => true,
                        };
                        if !slept {
                            emit(&events, Event::Cancelled { attempt: attempts_made });
                            yield Err(StreamError::Cancelled);
                            return;
                        }
                        attempt_index = attempts_made;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

/// Builder for [`StreamingClient`].
pub struct StreamingClientBuilder {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    timeouts: TimeoutPolicy,
    events: Option<SharedEventHandler>,
    context: String,
}

impl StreamingClientBuilder {
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Receive structured events. Defaults to [`TracingEventHandler`].
    pub fn event_handler(mut self, handler: SharedEventHandler) -> Self {
        self.events = Some(handler);
        self
    }

    /// Operation name used in user-facing error messages
    /// (e.g. `"Resume generation"`).
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn build(self) -> StreamingClient {
        StreamingClient {
            backend: self.backend,
            retry: self.retry,
            timeouts: self.timeouts,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(TracingEventHandler)),
            context: self.context,
        }
    }
}

/// Convenience for callers that only need the final fragments: drain
/// `stream`, keeping only the fragments of the last attempt.
pub async fn collect_final(mut stream: GenerationStream) -> Result<Vec<Value>, StreamError> {
    let mut current: Option<u32> = None;
    let mut payloads = Vec::new();
    while let Some(item) = stream.next().await {
        let fragment = item?;
        if current != Some(fragment.attempt) {
            current = Some(fragment.attempt);
            payloads.clear();
        }
        payloads.push(fragment.payload);
    }
    Ok(payloads)
}

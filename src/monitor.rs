//! Time-to-first-fragment deadline and inter-fragment heartbeat for streams.
//!
//! [`monitor`] wraps a fallible stream and passes every item through
//! unchanged and in order, while watching two independent clocks:
//!
//! - **First-fragment deadline.** If no fragment has arrived when it expires,
//!   the `on_timeout` hook fires and the stream is flagged as timed out. The
//!   next fragment to arrive is then replaced by a [`TimeoutError`] and the
//!   stream ends.
//! - **Heartbeat.** After the first fragment, a watchdog re-checks every
//!   `heartbeat_interval`; when the gap since the last fragment exceeds the
//!   interval, `on_heartbeat_warning` fires. Warnings are advisory and never
//!   end the stream.
//!
//! Both timers belong to the [`MonitoredStream`] and are dropped when the
//! stream finishes, errors, or is dropped by its consumer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::{sleep, Instant, Sleep};

use crate::timeout::TimeoutError;

/// Callback receiving a duration (the deadline, or the gap since the last
/// fragment).
pub type MonitorHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// Options for [`monitor`].
#[derive(Clone)]
pub struct MonitorOptions {
    /// Deadline for the first fragment.
    pub first_fragment_timeout: Duration,
    /// Watchdog period after the first fragment. `None` disables it.
    pub heartbeat_interval: Option<Duration>,
    /// Invoked once when the first-fragment deadline expires.
    pub on_timeout: Option<MonitorHook>,
    /// Invoked on every watchdog tick that finds the stream stalled.
    pub on_heartbeat_warning: Option<MonitorHook>,
}

impl MonitorOptions {
    pub fn new(first_fragment_timeout: Duration) -> Self {
        Self {
            first_fragment_timeout,
            heartbeat_interval: None,
            on_timeout: None,
            on_heartbeat_warning: None,
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn on_timeout(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    pub fn on_heartbeat_warning(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_heartbeat_warning = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for MonitorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorOptions")
            .field("first_fragment_timeout", &self.first_fragment_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("has_on_timeout", &self.on_timeout.is_some())
            .field("has_on_heartbeat_warning", &self.on_heartbeat_warning.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Armed,
    Streaming,
    Done,
}

/// Stream returned by [`monitor`].
pub struct MonitoredStream<S> {
    inner: S,
    options: MonitorOptions,
    phase: Phase,
    deadline: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Pin<Box<Sleep>>>,
    last_fragment_at: Instant,
    timed_out: bool,
}

/// Wrap `stream` with the first-fragment deadline and heartbeat watchdog.
///
/// The deadline starts counting immediately.
pub fn monitor<S, T, E>(stream: S, options: MonitorOptions) -> MonitoredStream<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: From<TimeoutError>,
{
    let deadline = Box::pin(sleep(options.first_fragment_timeout));
    MonitoredStream {
        inner: stream,
        options,
        phase: Phase::Armed,
        deadline: Some(deadline),
        heartbeat: None,
        last_fragment_at: Instant::now(),
        timed_out: false,
    }
}

impl<S> MonitoredStream<S> {
    /// Whether the first-fragment deadline has expired without a fragment.
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        self.deadline = None;
        self.heartbeat = None;
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) {
        let Some(deadline) = self.deadline.as_mut() else {
            return;
        };
        if deadline.as_mut().poll(cx).is_ready() {
            self.deadline = None;
            self.timed_out = true;
            if let Some(hook) = &self.options.on_timeout {
                hook(self.options.first_fragment_timeout);
            }
        }
    }

    fn poll_heartbeat(&mut self, cx: &mut Context<'_>) {
        let Some(interval) = self.options.heartbeat_interval else {
            return;
        };
        let Some(heartbeat) = self.heartbeat.as_mut() else {
            return;
        };
        while heartbeat.as_mut().poll(cx).is_ready() {
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_fragment_at);
            if elapsed > interval {
                if let Some(hook) = &self.options.on_heartbeat_warning {
                    hook(elapsed);
                }
            }
            heartbeat.as_mut().reset(now + interval);
        }
    }
}

impl<S, T, E> Stream for MonitoredStream<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: From<TimeoutError>,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.phase == Phase::Done {
            return Poll::Ready(None);
        }

        this.poll_deadline(cx);
        this.poll_heartbeat(cx);

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(item))) => {
                this.last_fragment_at = Instant::now();
                if this.phase == Phase::Armed {
                    this.phase = Phase::Streaming;
                    this.deadline = None;
                    if let Some(interval) = this.options.heartbeat_interval {
                        this.heartbeat = Some(Box::pin(sleep(interval)));
                    }
                }
                if this.timed_out {
                    this.finish();
                    return Poll::Ready(Some(Err(E::from(TimeoutError::new(
                        "first-fragment",
                        this.options.first_fragment_timeout,
                    )))));
                }
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> fmt::Debug for MonitoredStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredStream")
            .field("options", &self.options)
            .field("phase", &self.phase)
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    type Item = Result<&'static str, TimeoutError>;

    /// Yields each value after its delay.
    fn delayed(steps: Vec<(u64, &'static str)>) -> BoxStream<'static, Item> {
        Box::pin(async_stream::stream! {
            for (delay_ms, value) in steps {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                yield Ok(value);
            }
        })
    }

    fn counter() -> (Arc<AtomicU32>, impl Fn(Duration) + Send + Sync + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let hook_count = Arc::clone(&count);
        (count, move |_| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_passthrough_in_order() {
        let stream = delayed(vec![(10, "a"), (10, "b"), (10, "c")]);
        let monitored = monitor(stream, MonitorOptions::new(Duration::from_secs(1)));
        let items: Vec<_> = monitored.collect().await;
        assert_eq!(items, vec![Ok("a"), Ok("b"), Ok("c")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fragment_just_in_time_does_not_trigger() {
        let (timeouts, hook) = counter();
        let stream = delayed(vec![(44_999, "late but fine")]);
        let monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_millis(45_000)).on_timeout(hook),
        );
        let items: Vec<_> = monitored.collect().await;
        assert_eq!(items, vec![Ok("late but fine")]);
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fragment_timeout_fires_and_rejects_late_fragment() {
        let (timeouts, hook) = counter();
        let stream = delayed(vec![(200, "too late"), (1, "never seen")]);
        let mut monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_millis(100)).on_timeout(hook),
        );

        let first = monitored.next().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        let err = first.and_then(|r| r.err()).map(|e| e.label);
        assert_eq!(err.as_deref(), Some("first-fragment"));
        assert!(monitored.is_timed_out());
        assert!(monitored.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_hook_fires_while_waiting() {
        let (timeouts, hook) = counter();
        let stream = delayed(vec![(10_000, "x")]);
        let mut monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_millis(100)).on_timeout(hook),
        );

        // The hook fires at the deadline even though no fragment has arrived.
        let waited = tokio::time::timeout(Duration::from_millis(500), monitored.next()).await;
        assert!(waited.is_err());
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_warns_without_terminating() {
        let gaps = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&gaps);
        let stream = delayed(vec![(0, "1"), (10, "2"), (250, "3")]);
        let monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_secs(5))
                .with_heartbeat(Duration::from_millis(100))
                .on_heartbeat_warning(move |gap| seen.lock().unwrap().push(gap)),
        );

        let items: Vec<_> = monitored.collect().await;
        assert_eq!(items, vec![Ok("1"), Ok("2"), Ok("3")]);

        let gaps = gaps.lock().unwrap();
        assert!(!gaps.is_empty(), "expected at least one heartbeat warning");
        assert!(gaps.iter().all(|g| *g > Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_warning_on_steady_stream() {
        let (warnings, hook) = counter();
        let stream = delayed(vec![(0, "1"), (50, "2"), (50, "3"), (50, "4")]);
        let monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_secs(5))
                .with_heartbeat(Duration::from_millis(100))
                .on_heartbeat_warning(hook),
        );
        let items: Vec<_> = monitored.collect().await;
        assert_eq!(items.len(), 4);
        assert_eq!(warnings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_passes_through_and_ends() {
        let stream: BoxStream<'static, Item> = Box::pin(async_stream::stream! {
            yield Ok("a");
            yield Err(TimeoutError::new("upstream", Duration::from_millis(1)));
            yield Ok("b");
        });
        let items: Vec<_> = monitor(stream, MonitorOptions::new(Duration::from_secs(1)))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a"));
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_cleared_after_completion() {
        let (timeouts, hook) = counter();
        let (warnings, warn_hook) = counter();
        let stream = delayed(vec![(1, "only")]);
        let mut monitored = monitor(
            stream,
            MonitorOptions::new(Duration::from_millis(100))
                .with_heartbeat(Duration::from_millis(10))
                .on_timeout(hook)
                .on_heartbeat_warning(warn_hook),
        );
        while monitored.next().await.is_some() {}

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitored.next().await.is_none());
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(warnings.load(Ordering::SeqCst), 0);
    }
}

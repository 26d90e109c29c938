//! Scripted backend for testing without a live provider.
//!
//! [`MockBackend`] plays one [`MockAttempt`] per `open_stream` call, in
//! order, and repeats the last entry once the script runs out. Attempts can
//! fail to connect, stall, hang after connecting, or stream fragments with
//! delays and mid-stream errors.
//!
//! # Example
//!
//! ```
//! use llm_resilience::backend::{MockAttempt, MockBackend};
//!
//! let mock = MockBackend::new(vec![
//!     MockAttempt::status(503),
//!     MockAttempt::fragments(["A", "B"]),
//! ]);
//! assert_eq!(mock.connections(), 0);
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, FragmentStream, GenerateRequest};
use crate::error::{NetworkErrorKind, ProviderError};

/// A failure the mock can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum MockError {
    /// HTTP-style failure with a status and body.
    Status(u16, String),
    /// Connection dropped.
    Network(String),
    /// Plain error message with no status.
    Message(String),
}

impl MockError {
    fn to_provider_error(&self) -> ProviderError {
        match self {
            MockError::Status(status, body) => ProviderError::http(*status, body.clone()),
            MockError::Network(message) => ProviderError::Network {
                kind: NetworkErrorKind::ConnectionReset,
                message: message.clone(),
            },
            MockError::Message(message) => ProviderError::Other(message.clone()),
        }
    }
}

/// One step of a scripted stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Yield a fragment.
    Fragment(Value),
    /// Wait before the next step.
    Delay(Duration),
    /// Fail the stream.
    Error(MockError),
}

/// Scripted behavior for one `open_stream` call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockAttempt {
    /// Connection fails.
    Fail(MockError),
    /// Connection never resolves.
    Stall,
    /// Connection succeeds; the stream never yields and never ends.
    Hang,
    /// Connection succeeds and the stream plays these steps.
    Stream(Vec<MockStep>),
}

impl MockAttempt {
    /// Connection fails with an HTTP status.
    pub fn status(status: u16) -> Self {
        MockAttempt::Fail(MockError::Status(status, format!("mock status {}", status)))
    }

    /// Stream the given string fragments without delay.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockAttempt::Stream(
            fragments
                .into_iter()
                .map(|f| MockStep::Fragment(Value::String(f.into())))
                .collect(),
        )
    }
}

/// A test backend that plays scripted attempts in order.
#[derive(Debug)]
pub struct MockBackend {
    script: Vec<MockAttempt>,
    connections: AtomicU32,
}

impl MockBackend {
    /// Create a mock with the given script.
    ///
    /// An empty script behaves like a single attempt that streams nothing.
    pub fn new(script: Vec<MockAttempt>) -> Self {
        Self {
            script,
            connections: AtomicU32::new(0),
        }
    }

    /// A mock whose every attempt streams `fragments`.
    pub fn fixed<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(vec![MockAttempt::fragments(fragments)])
    }

    /// Number of `open_stream` calls made so far.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    fn next_attempt(&self) -> MockAttempt {
        let idx = self.connections.fetch_add(1, Ordering::SeqCst) as usize;
        self.script
            .get(idx)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(MockAttempt::Stream(Vec::new()))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn open_stream(&self, _request: &GenerateRequest) -> Result<FragmentStream, ProviderError> {
        match self.next_attempt() {
            MockAttempt::Fail(err) => Err(err.to_provider_error()),
            MockAttempt::Stall => {
                futures::future::pending::<()>().await;
                Err(ProviderError::Other("stalled connection resolved".into()))
            }
            MockAttempt::Hang => Ok(Box::pin(futures::stream::pending())),
            MockAttempt::Stream(steps) => {
                let stream = async_stream::stream! {
                    for step in steps {
                        match step {
                            MockStep::Fragment(value) => yield Ok(value),
                            MockStep::Delay(delay) => tokio::time::sleep(delay).await,
                            MockStep::Error(err) => {
                                yield Err(err.to_provider_error());
                                return;
                            }
                        }
                    }
                };
                Ok(Box::pin(stream))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

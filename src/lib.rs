//! # LLM Resilience
//!
//! A resilient client for streamed LLM generations.
//!
//! Long-running generations fail in ways a single HTTP call does not: the
//! provider is overloaded, the first token takes a minute, the stream stalls
//! halfway, or the user hits "Cancel". This crate wraps a streaming provider
//! with deadlines, retry with jittered backoff, cooperative cancellation and
//! stable user-facing error categories.
//!
//! ## Core Concepts
//!
//! - **[`StreamingClient`]** opens a generation through a [`Backend`],
//!   forwards [`Fragment`]s as they arrive and restarts the whole generation
//!   on retryable failures.
//! - **[`RetryPolicy`]** and **[`TimeoutPolicy`]** configure the retry loop
//!   and the four per-attempt deadlines.
//! - **[`monitor`]** wraps any fragment stream with a first-fragment
//!   deadline and an advisory heartbeat watchdog.
//! - **[`classify`](classify::classify)** and
//!   **[`translate`](translate::translate)** turn raw provider failures into
//!   an [`ErrorCategory`] and a message fit for end users.
//! - **[`GenerationBuffer`]** accumulates Gemini chunks into reasoning steps
//!   and output text, resetting when a retry starts over.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use llm_resilience::{
//!     CancellationToken, ClientConfig, GeminiBackend, GenerationBuffer, StreamingClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env();
//!     let backend = Arc::new(GeminiBackend::from_config(&config));
//!     let client = StreamingClient::from_config(backend, &config);
//!
//!     let cancel = CancellationToken::new();
//!     let mut stream = client.stream(config.request("Summarize Rust in one line"), cancel);
//!     let mut buffer = GenerationBuffer::new();
//!     while let Some(fragment) = stream.next().await {
//!         buffer.push(&fragment?);
//!     }
//!     println!("{}", buffer.text());
//!     Ok(())
//! }
//! ```

pub mod accumulate;
pub mod attempt;
pub mod backend;
pub mod backoff;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod timeout;
pub mod translate;

pub use accumulate::{GenerationBuffer, ThoughtStep};
pub use attempt::{Attempt, AttemptOutcome};
pub use backend::{Backend, GeminiBackend, GenerateRequest, InferenceConfig, MockBackend};
pub use backoff::{backoff_delay, RetryPolicy};
pub use classify::{ClassifiedError, ErrorCategory};
pub use client::{collect_final, Fragment, GenerationStream, StreamingClient, StreamingClientBuilder};
pub use config::ClientConfig;
pub use error::{ProviderError, Result, StreamError};
pub use events::{Event, EventHandler, FnEventHandler, TracingEventHandler};
pub use monitor::{monitor, MonitorOptions, MonitoredStream};
pub use timeout::{with_timeout, TimeoutError, TimeoutPolicy};

pub use tokio_util::sync::CancellationToken;

//! Provider trait and normalized request types.
//!
//! The [`Backend`] trait abstracts over streaming LLM providers. A backend
//! opens one streamed generation per call and hands back a stream of opaque
//! JSON fragments; the streaming client adds timeouts, retries, and
//! cancellation on top.
//!
//! ## Architecture
//!
//! ```text
//! StreamingClient ──► GenerateRequest ──► Backend::open_stream() ──► FragmentStream
//!                                                 │
//!                                   ┌─────────────┴─────────────┐
//!                              GeminiBackend                MockBackend
//!                    :streamGenerateContent?alt=sse       scripted attempts
//! ```

pub mod gemini;
pub mod mock;
pub mod sse;

pub use gemini::GeminiBackend;
pub use mock::{MockAttempt, MockBackend, MockError, MockStep};

use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Stream of raw fragments from one provider call.
pub type FragmentStream = BoxStream<'static, Result<Value, ProviderError>>;

/// Sampling options for a generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceConfig {
    /// Temperature (0.0 = deterministic).
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Top-k sampling cutoff.
    pub top_k: Option<u32>,
    /// Maximum tokens to generate.
    pub max_output_tokens: Option<u32>,
    /// Ask the model to stream its reasoning alongside the output.
    pub include_thoughts: bool,
}

impl InferenceConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_thoughts(mut self, enabled: bool) -> Self {
        self.include_thoughts = enabled;
        self
    }
}

/// A normalized, provider-agnostic generation request.
///
/// Every retry re-sends the same request from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Model identifier (e.g. `"gemini-2.5-pro"`).
    pub model: String,
    /// Optional system instruction.
    pub system_prompt: Option<String>,
    /// The user prompt text.
    pub prompt: String,
    /// Sampling options.
    pub config: InferenceConfig,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            config: InferenceConfig::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_config(mut self, config: InferenceConfig) -> Self {
        self.config = config;
        self
    }
}

/// Abstraction over streaming LLM providers.
///
/// `open_stream` resolves once the provider has accepted the request
/// (connection phase); the returned stream then yields fragments until the
/// generation completes or fails.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start a streamed generation.
    async fn open_stream(&self, request: &GenerateRequest) -> Result<FragmentStream, ProviderError>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

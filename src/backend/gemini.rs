//! Backend for the Gemini `streamGenerateContent` API.
//!
//! [`GeminiBackend`] sends normalized [`GenerateRequest`]s to
//! `/v1beta/models/{model}:streamGenerateContent?alt=sse` and yields each
//! SSE chunk as an opaque JSON fragment. Chunk content (reasoning parts vs.
//! output text) is left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::sse::SseDecoder;
use super::{Backend, FragmentStream, GenerateRequest};
use crate::config::ClientConfig;
use crate::error::ProviderError;

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Backend for Google's Gemini API.
///
/// # Example
///
/// ```
/// use llm_resilience::backend::GeminiBackend;
///
/// let backend = GeminiBackend::new("my-api-key");
/// let local = GeminiBackend::new("key").with_base_url("http://localhost:8080/");
/// ```
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.chars().count() > 6 {
            format!("{}***", self.api_key.chars().take(6).collect::<String>())
        } else {
            "***".to_string()
        };
        f.debug_struct("GeminiBackend")
            .field("api_key", &key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiBackend {
    /// Create a backend against the public endpoint.
    ///
    /// The HTTP client carries no overall timeout: a streamed generation can
    /// legitimately run for minutes, and the streaming client enforces its
    /// own deadlines.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Build from a loaded [`ClientConfig`].
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_key.clone()).with_base_url(&config.base_url)
    }

    /// Point at a different endpoint (proxy, emulator, test server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    /// Build the JSON request body.
    fn build_body(request: &GenerateRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
        });

        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let cfg = &request.config;
        let mut generation = serde_json::Map::new();
        if let Some(t) = cfg.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(p) = cfg.top_p {
            generation.insert("topP".into(), json!(p));
        }
        if let Some(k) = cfg.top_k {
            generation.insert("topK".into(), json!(k));
        }
        if let Some(max) = cfg.max_output_tokens {
            generation.insert("maxOutputTokens".into(), json!(max));
        }
        if cfg.include_thoughts {
            generation.insert("thinkingConfig".into(), json!({ "includeThoughts": true }));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        body
    }

    /// Parse a Retry-After header value as seconds.
    fn parse_retry_after(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }

    /// Build a [`ProviderError`] from a non-success response body.
    fn http_error(status: u16, body: String, retry_after: Option<Duration>) -> ProviderError {
        let code = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error.status);
        ProviderError::HttpError {
            status,
            body,
            code,
            retry_after,
        }
    }

    /// An `{"error": {...}}` object sent inside the stream, if `value` is one.
    fn in_stream_error(value: &Value) -> Option<ProviderError> {
        value.get("error")?;
        let envelope: ErrorEnvelope = serde_json::from_value(value.clone()).ok()?;
        Some(ProviderError::Api {
            message: envelope.error.message,
            status: envelope.error.code,
            code: envelope.error.status,
        })
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<FragmentStream, ProviderError> {
        let url = self.endpoint(&request.model);
        let body = Self::build_body(request);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::http_error(status, text, retry_after));
        }

        let mut bytes = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ProviderError::Request(e));
                        return;
                    }
                };
                for value in decoder.decode(&chunk) {
                    if let Some(err) = Self::in_stream_error(&value) {
                        yield Err(err);
                        return;
                    }
                    yield Ok(value);
                }
            }
            for value in decoder.flush() {
                if let Some(err) = Self::in_stream_error(&value) {
                    yield Err(err);
                    return;
                }
                yield Ok(value);
            }
        };
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

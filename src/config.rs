//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so loading never fails: missing, empty or
//! unparseable values fall back silently.
//!
//! | Variable                            | Default                                      |
//! |-------------------------------------|----------------------------------------------|
//! | `GEMINI_MODEL`                      | `gemini-3-pro-preview`                       |
//! | `GEMINI_API_KEY` (or `API_KEY`)     | empty                                        |
//! | `GEMINI_BASE_URL`                   | `https://generativelanguage.googleapis.com` |
//! | `GEMINI_TEMPERATURE`                | unset                                        |
//! | `GEMINI_TOP_P`                      | unset                                        |
//! | `GEMINI_TOP_K`                      | unset                                        |
//! | `GEMINI_MAX_OUTPUT_TOKENS`          | unset                                        |
//! | `GEMINI_MAX_RETRIES`                | 4                                            |
//! | `GEMINI_BASE_DELAY`                 | 1000 ms                                      |
//! | `GEMINI_MAX_DELAY`                  | 30000 ms                                     |
//! | `GEMINI_CONNECTION_TIMEOUT`         | 15000 ms                                     |
//! | `GEMINI_REQUEST_TIMEOUT`            | 120000 ms                                    |
//! | `GEMINI_FIRST_TOKEN_TIMEOUT`        | 45000 ms                                     |
//! | `GEMINI_STREAM_HEARTBEAT_INTERVAL`  | 10000 ms                                     |

use std::str::FromStr;
use std::time::Duration;

use crate::backend::gemini::DEFAULT_BASE_URL;
use crate::backend::{GenerateRequest, InferenceConfig};
use crate::backoff::RetryPolicy;
use crate::timeout::TimeoutPolicy;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Everything needed to build a Gemini backend and a streaming client.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub inference: InferenceConfig,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_empty() { "<unset>" } else { "***" };
        f.debug_struct("ClientConfig")
            .field("model", &self.model)
            .field("api_key", &key)
            .field("base_url", &self.base_url)
            .field("inference", &self.inference)
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            inference: InferenceConfig::default(),
            retry: RetryPolicy::default(),
            timeouts: TimeoutPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load from the process environment, reading a `.env` file first if
    /// one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Example
    ///
    /// ```
    /// use llm_resilience::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::from_lookup(|key| match key {
    ///     "GEMINI_MAX_RETRIES" => Some("2".to_string()),
    ///     "GEMINI_BASE_DELAY" => Some("not a number".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.retry.max_retries, 2);
    /// assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = EnvReader(lookup);

        let retry_defaults = RetryPolicy::default();
        let base_delay = env.millis("GEMINI_BASE_DELAY", retry_defaults.base_delay);
        let max_delay = env.millis("GEMINI_MAX_DELAY", retry_defaults.max_delay).max(base_delay);
        let retry = RetryPolicy {
            max_retries: env.number("GEMINI_MAX_RETRIES").unwrap_or(retry_defaults.max_retries),
            base_delay,
            max_delay,
            ..retry_defaults
        };

        let timeout_defaults = TimeoutPolicy::default();
        let timeouts = TimeoutPolicy {
            connection_timeout: env.millis(
                "GEMINI_CONNECTION_TIMEOUT",
                timeout_defaults.connection_timeout,
            ),
            request_timeout: env.millis("GEMINI_REQUEST_TIMEOUT", timeout_defaults.request_timeout),
            first_fragment_timeout: env.millis(
                "GEMINI_FIRST_TOKEN_TIMEOUT",
                timeout_defaults.first_fragment_timeout,
            ),
            heartbeat_interval: env.millis(
                "GEMINI_STREAM_HEARTBEAT_INTERVAL",
                timeout_defaults.heartbeat_interval,
            ),
        };

        let inference = InferenceConfig {
            temperature: env.float("GEMINI_TEMPERATURE"),
            top_p: env.float("GEMINI_TOP_P"),
            top_k: env.number("GEMINI_TOP_K"),
            max_output_tokens: env.number("GEMINI_MAX_OUTPUT_TOKENS"),
            include_thoughts: false,
        };

        Self {
            model: env.string("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: env
                .string("GEMINI_API_KEY")
                .or_else(|| env.string("API_KEY"))
                .unwrap_or_default(),
            base_url: env
                .string("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            inference,
            retry,
            timeouts,
        }
    }

    /// Whether an API key was found.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// A request for `prompt` using the configured model and sampling options.
    pub fn request(&self, prompt: impl Into<String>) -> GenerateRequest {
        GenerateRequest::new(self.model.clone(), prompt).with_config(self.inference.clone())
    }
}

/// Typed, forgiving access to a variable lookup.
struct EnvReader<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    /// Trimmed value; empty counts as unset.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Integer value, truncating a fractional part (`"1500.0"`).
    fn number<T: FromStr>(&self, key: &str) -> Option<T> {
        let value = self.string(key)?;
        value
            .parse()
            .ok()
            .or_else(|| value.split('.').next().and_then(|whole| whole.parse().ok()))
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.string(key)?.parse().ok().filter(|v: &f64| v.is_finite())
    }

    /// Positive millisecond duration, else `default`.
    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.number::<u64>(key)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ClientConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.model, "gemini-3-pro-preview");
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.timeouts.connection_timeout, Duration::from_millis(15_000));
        assert_eq!(config.timeouts.request_timeout, Duration::from_millis(120_000));
        assert_eq!(config.timeouts.first_fragment_timeout, Duration::from_millis(45_000));
        assert_eq!(config.timeouts.heartbeat_interval, Duration::from_millis(10_000));
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_overrides_applied() {
        let config = load(&[
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_TEMPERATURE", "0.7"),
            ("GEMINI_TOP_K", "32"),
            ("GEMINI_MAX_OUTPUT_TOKENS", "8192"),
            ("GEMINI_MAX_RETRIES", "2"),
            ("GEMINI_BASE_DELAY", "100"),
            ("GEMINI_MAX_DELAY", "5000"),
            ("GEMINI_FIRST_TOKEN_TIMEOUT", "60000"),
        ]);
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.inference.temperature, Some(0.7));
        assert_eq!(config.inference.top_p, None);
        assert_eq!(config.inference.top_k, Some(32));
        assert_eq!(config.inference.max_output_tokens, Some(8192));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_millis(5000));
        assert_eq!(config.timeouts.first_fragment_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_fall_back_silently() {
        let config = load(&[
            ("GEMINI_MAX_RETRIES", "-1"),
            ("GEMINI_BASE_DELAY", "soon"),
            ("GEMINI_CONNECTION_TIMEOUT", "0"),
            ("GEMINI_TEMPERATURE", "warm"),
            ("GEMINI_MODEL", "   "),
        ]);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.timeouts.connection_timeout, Duration::from_millis(15_000));
        assert_eq!(config.inference.temperature, None);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_max_delay_raised_to_base_delay() {
        let config = load(&[("GEMINI_BASE_DELAY", "5000"), ("GEMINI_MAX_DELAY", "100")]);
        assert_eq!(config.retry.base_delay, Duration::from_millis(5000));
        assert_eq!(config.retry.max_delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_api_key_fallback() {
        let config = load(&[("API_KEY", "fallback")]);
        assert_eq!(config.api_key, "fallback");

        let config = load(&[("API_KEY", "fallback"), ("GEMINI_API_KEY", "primary")]);
        assert_eq!(config.api_key, "primary");
    }

    #[test]
    fn test_fractional_integers_truncate() {
        let config = load(&[("GEMINI_BASE_DELAY", "1500.9"), ("GEMINI_TOP_K", "40.0")]);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1500));
        assert_eq!(config.inference.top_k, Some(40));
    }

    #[test]
    fn test_request_uses_model_and_inference() {
        let config = load(&[("GEMINI_MODEL", "m"), ("GEMINI_TEMPERATURE", "0.1")]);
        let request = config.request("hello");
        assert_eq!(request.model, "m");
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.config.temperature, Some(0.1));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = load(&[("GEMINI_API_KEY", "very-secret")]);
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
    }
}

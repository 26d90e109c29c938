//! Retry classification for provider failures.
//!
//! [`classify`] maps a raw [`ProviderError`] to an [`ErrorCategory`];
//! [`is_retryable`] answers whether the client should try again.
//!
//! Decision order:
//!
//! 1. Auth and validation failures are terminal, whatever else the error
//!    says: status 401/403 or any other 4xx except 429, or an auth keyword
//!    in the message.
//! 2. Transient keywords in the message (overloaded, rate limit, timeout,
//!    connection, `ECONNRESET`, ...).
//! 3. Status 429, 500, 502, 503, 504.
//! 4. Network-error family by type name (timeout, connection, DNS).
//! 5. Provider code containing `rate_limit`, `quota`, `overload` or
//!    `unavailable`.
//! 6. Anything else is [`ErrorCategory::Unknown`] and not retried.

use crate::error::ProviderError;

/// Stable failure categories shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    RateLimited,
    Overloaded,
    Timeout,
    Network,
    AuthFailure,
    ValidationFailure,
    Unknown,
}

impl ErrorCategory {
    /// Whether failures in this category are transient.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::Overloaded
                | ErrorCategory::Timeout
                | ErrorCategory::Network
        )
    }

    /// Stable machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Overloaded => "overloaded",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::AuthFailure => "auth_failure",
            ErrorCategory::ValidationFailure => "validation_failure",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const AUTH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "authentication",
    "invalid api key",
    "invalid key",
    "api key not valid",
    "api_key_invalid",
];

// Checked in order; the first matching group decides the category.
const MESSAGE_KEYWORDS: &[(&[&str], ErrorCategory)] = &[
    (&["overloaded"], ErrorCategory::Overloaded),
    (&["rate limit", "quota"], ErrorCategory::RateLimited),
    (&["timeout", "etimedout"], ErrorCategory::Timeout),
    (
        &["connection", "network", "econnreset", "econnrefused"],
        ErrorCategory::Network,
    ),
    (
        &["try again later", "service unavailable", "temporary"],
        ErrorCategory::Overloaded,
    ),
];

const NETWORK_TYPE_NAMES: &[&str] = &[
    "networkerror",
    "timeouterror",
    "connectionerror",
    "econnreset",
    "etimedout",
    "econnrefused",
    "enotfound",
];

/// A provider failure together with its classification.
#[derive(Debug)]
pub struct ClassifiedError {
    /// Whether the client may retry after this failure.
    pub is_retryable: bool,
    /// Failure category.
    pub category: ErrorCategory,
    /// Raw error message (not user-facing).
    pub message: String,
    /// The original failure.
    pub cause: ProviderError,
}

impl ClassifiedError {
    /// Classify `cause`, taking ownership of it.
    pub fn new(cause: ProviderError) -> Self {
        let category = classify(&cause);
        Self {
            is_retryable: category.is_retryable(),
            category,
            message: cause.to_string(),
            cause,
        }
    }
}

impl From<ProviderError> for ClassifiedError {
    fn from(cause: ProviderError) -> Self {
        Self::new(cause)
    }
}

/// Whether the client should retry after `error`.
pub fn is_retryable(error: &ProviderError) -> bool {
    classify(error).is_retryable()
}

/// Map a raw failure to its category.
pub fn classify(error: &ProviderError) -> ErrorCategory {
    let message = error.to_string().to_lowercase();
    let status = error.status();

    if matches!(status, Some(401 | 403)) || contains_any(&message, AUTH_KEYWORDS) {
        return ErrorCategory::AuthFailure;
    }
    if let Some(code) = status {
        if (400..500).contains(&code) && code != 429 {
            return ErrorCategory::ValidationFailure;
        }
    }

    if let Some(category) = MESSAGE_KEYWORDS
        .iter()
        .find(|(keywords, _)| contains_any(&message, keywords))
        .map(|(_, category)| *category)
    {
        return category;
    }

    match status {
        Some(429) => return ErrorCategory::RateLimited,
        Some(500 | 502 | 503) => return ErrorCategory::Overloaded,
        Some(504) => return ErrorCategory::Timeout,
        _ => {}
    }

    let type_name = error.kind_name().to_lowercase();
    if NETWORK_TYPE_NAMES.iter().any(|n| type_name.contains(n)) {
        return if type_name.contains("timeout") || type_name.contains("etimedout") {
            ErrorCategory::Timeout
        } else {
            ErrorCategory::Network
        };
    }

    if let Some(code) = error.code() {
        let code = code.to_lowercase();
        if code.contains("rate_limit") || code.contains("quota") {
            return ErrorCategory::RateLimited;
        }
        if code.contains("overload") || code.contains("unavailable") {
            return ErrorCategory::Overloaded;
        }
    }

    ErrorCategory::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorKind;
    use crate::timeout::TimeoutError;
    use std::time::Duration;

    fn http(status: u16, body: &str) -> ProviderError {
        ProviderError::http(status, body)
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable(&http(status, "")), "status {status}");
        }
        assert_eq!(classify(&http(429, "")), ErrorCategory::RateLimited);
        assert_eq!(classify(&http(503, "")), ErrorCategory::Overloaded);
        assert_eq!(classify(&http(504, "")), ErrorCategory::Timeout);
    }

    #[test]
    fn test_client_errors_are_terminal() {
        assert_eq!(classify(&http(400, "bad request")), ErrorCategory::ValidationFailure);
        assert_eq!(classify(&http(404, "")), ErrorCategory::ValidationFailure);
        assert!(!is_retryable(&http(422, "")));
    }

    #[test]
    fn test_auth_always_terminal_even_with_transient_words() {
        assert_eq!(classify(&http(401, "")), ErrorCategory::AuthFailure);
        assert_eq!(classify(&http(403, "")), ErrorCategory::AuthFailure);
        assert!(!is_retryable(&http(401, "upstream timeout")));
        assert!(!is_retryable(&http(403, "connection refused, try again later")));
        // Even a 4xx that mentions rate limiting stays terminal
        assert!(!is_retryable(&http(400, "rate limit policy invalid")));
    }

    #[test]
    fn test_auth_keywords_in_message() {
        let err = ProviderError::Other("Invalid API key provided".into());
        assert_eq!(classify(&err), ErrorCategory::AuthFailure);
        let err = ProviderError::Other("network unauthorized".into());
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_gemini_bad_key_400_is_auth_failure() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let err = ProviderError::http(400, body);
        assert_eq!(classify(&err), ErrorCategory::AuthFailure);

        let err = ProviderError::http(400, "Invalid JSON payload received.");
        assert_eq!(classify(&err), ErrorCategory::ValidationFailure);
    }

    #[test]
    fn test_message_keywords() {
        let cases = [
            ("The model is overloaded", ErrorCategory::Overloaded),
            ("Rate limit exceeded", ErrorCategory::RateLimited),
            ("Quota exhausted for project", ErrorCategory::RateLimited),
            ("read ETIMEDOUT", ErrorCategory::Timeout),
            ("socket hang up: ECONNRESET", ErrorCategory::Network),
            ("network unreachable", ErrorCategory::Network),
            ("Please try again later", ErrorCategory::Overloaded),
            ("temporary failure", ErrorCategory::Overloaded),
            ("Service Unavailable", ErrorCategory::Overloaded),
        ];
        for (message, expected) in cases {
            let err = ProviderError::Other(message.into());
            assert_eq!(classify(&err), expected, "{message}");
            assert!(is_retryable(&err), "{message}");
        }
    }

    #[test]
    fn test_network_family_by_type() {
        let err = ProviderError::Network {
            kind: NetworkErrorKind::DnsNotFound,
            message: "getaddrinfo failed".into(),
        };
        assert_eq!(classify(&err), ErrorCategory::Network);

        let err = ProviderError::Network {
            kind: NetworkErrorKind::TimedOut,
            message: "socket stalled".into(),
        };
        assert_eq!(classify(&err), ErrorCategory::Timeout);
    }

    #[test]
    fn test_timeout_error_is_retryable() {
        let err = ProviderError::from(TimeoutError::new("connect", Duration::from_secs(15)));
        assert!(is_retryable(&err));
        assert_eq!(classify(&err), ErrorCategory::Timeout);
    }

    #[test]
    fn test_provider_codes() {
        let err = ProviderError::Api {
            message: "stream aborted".into(),
            status: None,
            code: Some("RATE_LIMIT_EXCEEDED".into()),
        };
        assert_eq!(classify(&err), ErrorCategory::RateLimited);

        let err = ProviderError::Api {
            message: "stream aborted".into(),
            status: None,
            code: Some("UNAVAILABLE".into()),
        };
        assert_eq!(classify(&err), ErrorCategory::Overloaded);
    }

    #[test]
    fn test_unknown_fails_closed() {
        let err = ProviderError::Other("index out of bounds".into());
        assert_eq!(classify(&err), ErrorCategory::Unknown);
        assert!(!is_retryable(&err));
        assert!(!is_retryable(&http(418, "")));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let err = http(503, "model is overloaded");
        let first = classify(&err);
        for _ in 0..10 {
            assert_eq!(classify(&err), first);
        }
    }

    #[test]
    fn test_classified_error_carries_cause() {
        let classified = ClassifiedError::new(http(429, "slow down"));
        assert!(classified.is_retryable);
        assert_eq!(classified.category, ErrorCategory::RateLimited);
        assert_eq!(classified.message, "HTTP 429: slow down");
        assert_eq!(classified.cause.status(), Some(429));
    }
}

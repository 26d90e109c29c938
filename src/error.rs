use std::time::Duration;
use thiserror::Error;

use crate::classify::ErrorCategory;
use crate::timeout::TimeoutError;

/// Raw failures produced while talking to a provider.
///
/// These never reach the caller directly: the client classifies them and
/// surfaces a [`StreamError`] instead.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Non-success HTTP status from the provider.
    ///
    /// `code` holds the provider's own error code when the body carries one
    /// (e.g. Gemini's `RESOURCE_EXHAUSTED`). `retry_after` is parsed from the
    /// `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Provider-specific error code, if any.
        code: Option<String>,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Low-level HTTP transport failure that is not a plain network fault.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Network-level failure (reset, refused, DNS, socket timeout).
    #[error("{kind} network error: {message}")]
    Network {
        /// Which member of the network-error family this is.
        kind: NetworkErrorKind,
        /// Description from the underlying transport.
        message: String,
    },

    /// A deadline enforced by this crate expired.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The provider reported an error inside an otherwise healthy stream.
    #[error("{message}")]
    Api {
        /// Provider error message.
        message: String,
        /// HTTP-like status the provider attached to the error, if any.
        status: Option<u16>,
        /// Provider-specific error code, if any.
        code: Option<String>,
    },

    /// A fragment or error body could not be decoded.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

/// The network-error family recognised by the retry classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Socket-level timeout (`ETIMEDOUT`).
    TimedOut,
    /// Connection could not be established (`ECONNREFUSED`).
    ConnectionRefused,
    /// Connection dropped mid-flight (`ECONNRESET`).
    ConnectionReset,
    /// Host name did not resolve (`ENOTFOUND`).
    DnsNotFound,
    /// Any other transport failure.
    Other,
}

impl NetworkErrorKind {
    /// Error-type name in the style of the classic socket error families.
    pub fn type_name(self) -> &'static str {
        match self {
            NetworkErrorKind::TimedOut => "TimeoutError",
            NetworkErrorKind::ConnectionRefused | NetworkErrorKind::ConnectionReset => {
                "ConnectionError"
            }
            NetworkErrorKind::DnsNotFound => "ENOTFOUND",
            NetworkErrorKind::Other => "NetworkError",
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NetworkErrorKind::TimedOut => "ETIMEDOUT",
            NetworkErrorKind::ConnectionRefused => "ECONNREFUSED",
            NetworkErrorKind::ConnectionReset => "ECONNRESET",
            NetworkErrorKind::DnsNotFound => "ENOTFOUND",
            NetworkErrorKind::Other => "network",
        };
        f.write_str(label)
    }
}

impl ProviderError {
    /// HTTP-like status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::HttpError { status, .. } => Some(*status),
            ProviderError::Api { status, .. } => *status,
            ProviderError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Provider-specific error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::HttpError { code, .. } | ProviderError::Api { code, .. } => {
                code.as_deref()
            }
            _ => None,
        }
    }

    /// Name of the error's type, used to recognise the network-error family.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProviderError::HttpError { .. } => "HttpError",
            ProviderError::Request(e) if e.is_timeout() => "TimeoutError",
            ProviderError::Request(e) if e.is_connect() => "ConnectionError",
            ProviderError::Request(e) if e.is_body() || e.is_request() => "NetworkError",
            ProviderError::Request(_) => "RequestError",
            ProviderError::Network { kind, .. } => kind.type_name(),
            ProviderError::Timeout(_) => "TimeoutError",
            ProviderError::Api { .. } => "ApiError",
            ProviderError::Json(_) => "JsonError",
            ProviderError::Other(_) => "Error",
        }
    }

    /// `Retry-After` hint from the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::HttpError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Shorthand for an HTTP failure without body details.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        ProviderError::HttpError {
            status,
            body: body.into(),
            code: None,
            retry_after: None,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::TimedOut => NetworkErrorKind::TimedOut,
            ErrorKind::ConnectionRefused => NetworkErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                NetworkErrorKind::ConnectionReset
            }
            ErrorKind::UnexpectedEof | ErrorKind::NotConnected => NetworkErrorKind::Other,
            _ => return ProviderError::Other(err.to_string()),
        };
        ProviderError::Network {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Other(err.to_string())
    }
}

/// Errors surfaced to the caller of a streaming generation.
///
/// Cancellation is its own variant so a UI can tell "user aborted" apart
/// from "system failed" without inspecting messages.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The caller's cancellation token fired.
    #[error("Generation was cancelled")]
    Cancelled,

    /// Every attempt failed with a retryable error.
    #[error("{message} (gave up after {attempts} attempts)")]
    RetryExhausted {
        /// Category of the last failure.
        category: ErrorCategory,
        /// Total attempts made, initial call included.
        attempts: u32,
        /// Translated, user-presentable message.
        message: String,
        /// The raw failure of the last attempt.
        #[source]
        source: ProviderError,
    },

    /// A non-retryable failure; no retry was attempted after it.
    #[error("{message}")]
    Terminal {
        /// Category of the failure.
        category: ErrorCategory,
        /// Translated, user-presentable message.
        message: String,
        /// The raw failure.
        #[source]
        source: ProviderError,
    },

    /// Invalid policy or client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StreamError {
    /// Whether this is a user-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Failure category, `None` for cancellation and configuration errors.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            StreamError::RetryExhausted { category, .. } | StreamError::Terminal { category, .. } => {
                Some(*category)
            }
            _ => None,
        }
    }

    /// User-presentable message.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::RetryExhausted { message, .. } | StreamError::Terminal { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_accessors() {
        let err = ProviderError::HttpError {
            status: 429,
            body: "slow down".into(),
            code: Some("RESOURCE_EXHAUSTED".into()),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.code(), Some("RESOURCE_EXHAUSTED"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.kind_name(), "HttpError");
    }

    #[test]
    fn test_io_error_maps_to_network_family() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = ProviderError::from(io);
        assert!(matches!(
            err,
            ProviderError::Network {
                kind: NetworkErrorKind::ConnectionReset,
                ..
            }
        ));
        assert_eq!(err.kind_name(), "ConnectionError");
    }

    #[test]
    fn test_io_error_outside_family_is_other() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(ProviderError::from(io), ProviderError::Other(_)));
    }

    #[test]
    fn test_stream_error_category() {
        let err = StreamError::Terminal {
            category: ErrorCategory::AuthFailure,
            message: "bad key".into(),
            source: ProviderError::http(401, "unauthorized"),
        };
        assert_eq!(err.category(), Some(ErrorCategory::AuthFailure));
        assert_eq!(err.user_message(), "bad key");
        assert!(!err.is_cancelled());
        assert!(StreamError::Cancelled.is_cancelled());
        assert_eq!(StreamError::Cancelled.category(), None);
    }
}

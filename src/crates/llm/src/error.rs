//! Error types for LLM provider implementations.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to an LLM provider.
///
/// Every variant raised by a concrete adapter carries the id of the provider
/// that produced it, so callers can attribute failures without extra context.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failed (connect, DNS, body read).
    #[error("{provider}: HTTP request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// API authentication failed.
    #[error("{provider}: authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// Rate limit exceeded.
    #[error("{provider}: rate limit exceeded: {message}")]
    RateLimitExceeded { provider: String, message: String },

    /// Upstream answered with a non-success status.
    #[error("{provider}: API error {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// Upstream answered but the body could not be understood.
    #[error("{provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Provider is missing configuration (API key, base URL).
    #[error("{provider}: {message}")]
    NotConfigured { provider: String, message: String },

    /// Request timeout.
    #[error("{provider}: request timed out")]
    Timeout { provider: String },

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No provider registered under the requested id.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
}

impl LlmError {
    /// Wrap a reqwest error, classifying timeouts separately.
    pub fn http(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            LlmError::Http {
                provider: provider.to_string(),
                source: err,
            }
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        let provider = provider.to_string();
        match status {
            401 | 403 => LlmError::Authentication {
                provider,
                message: body,
            },
            429 => LlmError::RateLimitExceeded {
                provider,
                message: body,
            },
            _ => LlmError::Upstream {
                provider,
                status,
                message: body,
            },
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Id of the provider that raised this error, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            LlmError::Http { provider, .. }
            | LlmError::Authentication { provider, .. }
            | LlmError::RateLimitExceeded { provider, .. }
            | LlmError::Upstream { provider, .. }
            | LlmError::InvalidResponse { provider, .. }
            | LlmError::NotConfigured { provider, .. }
            | LlmError::Timeout { provider } => Some(provider),
            LlmError::Serialization(_) | LlmError::ProviderNotFound(_) => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http { .. } | LlmError::Timeout { .. } | LlmError::RateLimitExceeded { .. } => {
                true
            }
            LlmError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::Authentication { .. } | LlmError::NotConfigured { .. }
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

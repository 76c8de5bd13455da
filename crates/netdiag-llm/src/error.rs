//! Error types for netdiag-llm

use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured (missing key, empty base URL)
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Authentication rejected by the provider (401/403)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned a non-success status
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Sanitized message
        message: String,
    },

    /// Rate limit exceeded (429)
    #[error("rate limit exceeded")]
    RateLimit {
        /// Seconds the provider asked us to wait, if given
        retry_after: Option<u64>,
    },

    /// Request timed out
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Response could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether a retry with backoff may succeed.
    ///
    /// Timeouts, rate limits, connection failures and 5xx responses are
    /// transient. Authentication and configuration problems never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimit { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotConfigured(_) | Self::Auth(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Whether the error means the provider cannot be used at all.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::Auth(_))
    }

    /// Whether this is a rate-limit rejection
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! OpenAI client errors and their mapping onto domain errors.

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors from the chat completions API.
#[derive(Error, Debug)]
pub enum OpenAiError {
    /// No key in configuration or `OPENAI_API_KEY`
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    /// Rate limit or timeout settings the client cannot use
    #[error("Invalid OpenAI client configuration: {0}")]
    InvalidConfig(String),

    /// HTTP 401
    #[error("Invalid API key - authentication failed")]
    InvalidApiKey,

    /// HTTP 429
    #[error("Rate limit exceeded - too many requests")]
    RateLimitExceeded,

    /// HTTP 5xx
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Any other non-success status
    #[error("Request rejected ({0}): {1}")]
    Rejected(StatusCode, String),

    /// The per-request timeout elapsed
    #[error("Request timeout")]
    Timeout,

    /// Connection or transport failure
    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    /// The response had no message content.
    #[error("Response contained no message content")]
    EmptyResponse,

    /// The message content was not the JSON shape asked for.
    #[error("Unparseable response: {0}")]
    Unparseable(String),
}

impl OpenAiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::InvalidApiKey,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded,
            s if s.is_server_error() => Self::ServerError(s, body),
            s => Self::Rejected(s, body),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::Timeout | Self::NetworkError(_)
        )
    }
}

impl From<reqwest::Error> for OpenAiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(err)
        }
    }
}

impl From<OpenAiError> for DomainError {
    fn from(err: OpenAiError) -> Self {
        match err {
            OpenAiError::EmptyResponse | OpenAiError::Unparseable(_) => Self::UnparseableResponse(err.to_string()),
            other => Self::ExecutionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(OpenAiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(OpenAiError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!OpenAiError::from_status(StatusCode::UNAUTHORIZED, String::new()).is_transient());
        assert!(!OpenAiError::from_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn test_domain_conversion() {
        let err: DomainError = OpenAiError::Unparseable("not json".to_string()).into();
        assert!(matches!(err, DomainError::UnparseableResponse(_)));

        let err: DomainError = OpenAiError::Timeout.into();
        assert!(matches!(err, DomainError::ExecutionFailed(_)));
    }
}

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors that can occur when talking to a chat completions endpoint
#[derive(Error, Debug)]
pub enum LlmError {
    /// Invalid request parameters (HTTP 400, 422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid or missing API key (HTTP 401, 403)
    #[error("Authentication failed ({0})")]
    Unauthorized(StatusCode),

    /// Model or endpoint not found (HTTP 404)
    #[error("Endpoint or model not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded - too many requests")]
    RateLimitExceeded,

    /// Server error (HTTP 5xx)
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Body was not a chat completion
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unknown or unexpected status
    #[error("Unexpected status ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl LlmError {
    /// Classify a non-success status.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 | 422 => Self::InvalidRequest(body),
            401 | 403 => Self::Unauthorized(status),
            404 => Self::NotFound(body),
            429 => Self::RateLimitExceeded,
            500..=599 => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::NetworkError(_)
        )
    }
}

impl From<LlmError> for DomainError {
    fn from(err: LlmError) -> Self {
        DomainError::Model(err.to_string())
    }
}

//! Domain errors for the CoraWiki research orchestrator.

use thiserror::Error;

/// Domain-level errors that can occur during a research run.
///
/// Recoverable conditions (guarded reads, tool failures, malformed model
/// output, budget exhaustion) never surface here; they are folded into the
/// run as tool results or degraded conclusions. Only cancellation aborts a
/// run without a result.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Research run cancelled")]
    Cancelled,

    #[error("Model adapter error: {0}")]
    Model(String),

    #[error("Model adapter is not configured: {0}")]
    ModelNotConfigured(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Workspace path not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DomainError {
    /// Whether this error is the distinguished cancellation condition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::Model("boom".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(DomainError::Cancelled.to_string(), "Research run cancelled");
        assert_eq!(
            DomainError::Workspace("bad".to_string()).to_string(),
            "Workspace error: bad"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DomainError = io.into();
        assert!(matches!(err, DomainError::Io(_)));
    }
}

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while estimating, applying or undoing a fix.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No executor is registered for the resource/remediation pair.
    #[error("no executor registered for {resource_type}/{remediation_type}")]
    NotRegistered {
        resource_type: String,
        remediation_type: String,
    },

    /// The target resource does not exist in the inventory.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The request parameters are unusable for this executor.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The cloud API rejected or failed the change.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A rollback descriptor was produced by a different executor.
    #[error("rollback descriptor belongs to executor {found}, expected {expected}")]
    DescriptorMismatch { expected: String, found: String },

    /// The call did not complete within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The cloud API throttled the request.
    #[error("throttled")]
    Throttled,

    /// A descriptor or attribute payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ExecutorError {
    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Throttled
        )
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ExecutorError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(ExecutorError::Connection("reset".into()).is_retryable());
        assert!(ExecutorError::Throttled.is_retryable());
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!ExecutorError::ResourceNotFound("x".into()).is_retryable());
        assert!(!ExecutorError::ExecutionFailed("x".into()).is_retryable());
        assert!(!ExecutorError::InvalidParameters("x".into()).is_retryable());
        assert!(
            !ExecutorError::DescriptorMismatch {
                expected: "a".into(),
                found: "b".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn error_display() {
        let err = ExecutorError::NotRegistered {
            resource_type: "S3_BUCKET".into(),
            remediation_type: "ROTATE".into(),
        };
        assert_eq!(err.to_string(), "no executor registered for S3_BUCKET/ROTATE");

        let err = ExecutorError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "timeout after 500ms");
    }
}

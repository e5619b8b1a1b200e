use std::time::Duration;

use dossier_types::{ErrorType, ObjectKey};

/// Errors from object-store operations, already classified by cause.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable, connection dropped, or request timed out.
    #[error("object store unreachable: {0}")]
    Connection(String),

    /// Credentials rejected.
    #[error("object store rejected credentials: {0}")]
    Auth(String),

    /// Bucket missing or access to it denied.
    #[error("bucket error: {0}")]
    Bucket(String),

    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(ObjectKey),

    /// The call exceeded the caller's deadline.
    #[error("object store call timed out after {0:?}")]
    Timeout(Duration),

    /// Local I/O while preparing the request body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Wire-level kind of this failure.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Connection(_) | Self::Timeout(_) => ErrorType::ConnectionError,
            Self::Auth(_) => ErrorType::AuthError,
            Self::Bucket(_) => ErrorType::BucketError,
            Self::NotFound(_) => ErrorType::ProcessingError,
            Self::Io(_) | Self::Unknown(_) => ErrorType::UnknownError,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        self.error_type().is_retryable()
    }
}

/// Result alias for object-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(StoreError::Timeout(Duration::from_secs(1)).error_type(), ErrorType::ConnectionError);
        assert_eq!(StoreError::Auth("x".into()).error_type(), ErrorType::AuthError);
        assert_eq!(StoreError::Bucket("x".into()).error_type(), ErrorType::BucketError);
        assert!(StoreError::Connection("x".into()).is_transient());
        assert!(StoreError::Unknown("x".into()).is_transient());
        assert!(!StoreError::Auth("x".into()).is_transient());
        assert!(!StoreError::Bucket("x".into()).is_transient());
    }
}

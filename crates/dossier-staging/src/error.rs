use dossier_types::ValidationError;

/// Errors from the staging phase.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The upload was rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Local disk write or read failed. Transient and retryable.
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client byte stream failed or was aborted mid-upload.
    #[error("upload stream failed: {0}")]
    Stream(String),
}

/// Result alias for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

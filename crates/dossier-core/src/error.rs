use dossier_catalog::CatalogError;
use dossier_staging::StagingError;
use dossier_store::StoreError;
use dossier_types::{ErrorType, ObjectKey, ValidationError};

/// Failure of a document operation, classified per the wire taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// User-correctable rejection; nothing was written anywhere.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Local disk write failed while staging.
    #[error("staging failed: {0}")]
    Staging(StagingError),

    /// The object store refused or failed the write.
    #[error("commit failed: {0}")]
    Commit(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The object is in the store but the catalog write failed.
    #[error("object {key} was stored but not recorded: {source}")]
    Orphaned {
        key: ObjectKey,
        #[source]
        source: CatalogError,
    },
}

impl From<StagingError> for ServiceError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::Validation(v) => Self::Validation(v),
            other => Self::Staging(other),
        }
    }
}

impl ServiceError {
    /// Wire-level failure kind.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Validation(_) | Self::Staging(_) => ErrorType::ProcessingError,
            Self::Commit(e) => e.error_type(),
            Self::Catalog(CatalogError::Database(_) | CatalogError::Storage(_)) => {
                ErrorType::UnknownError
            }
            Self::Catalog(_) => ErrorType::ProcessingError,
            Self::Orphaned { .. } => ErrorType::ProcessingError,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Orphaned { .. } => false,
            Self::Staging(_) => true,
            Self::Commit(e) => e.is_transient(),
            Self::Catalog(e) => matches!(
                e,
                CatalogError::Contention { .. } | CatalogError::Database(_) | CatalogError::Storage(_)
            ),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_not_found(),
            Self::Commit(StoreError::NotFound(_)) => true,
            _ => false,
        }
    }
}

/// Result alias for document operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

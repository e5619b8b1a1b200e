use dossier_types::DocumentId;

/// Errors produced by catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No such document, or it belongs to someone else.
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("version {version} of document {id} not found")]
    VersionNotFound { id: DocumentId, version: u32 },

    /// New versions cannot be added to a soft-deleted document.
    #[error("document {0} is deleted")]
    Deleted(DocumentId),

    /// The compare-and-swap on `current_version_number` lost a race.
    #[error("version conflict on {id}: expected current {expected}, found {actual}")]
    Conflict {
        id: DocumentId,
        expected: u32,
        actual: u32,
    },

    /// Conflicts persisted past the retry budget.
    #[error("gave up allocating a version for {id} after {attempts} attempts")]
    Contention { id: DocumentId, attempts: u32 },

    /// A stored row could not be decoded.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),

    #[error("catalog storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::VersionNotFound { .. })
    }
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

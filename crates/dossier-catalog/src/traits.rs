use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dossier_types::{Document, DocumentId, DocumentStatus, ObjectKey, OwnerId, Version};

use crate::error::CatalogResult;

/// Persistence boundary for documents and their version chains.
///
/// Implementations must be thread-safe and make each method atomic:
/// - `insert_document` fails with `Conflict` if the id already exists.
/// - `append_version` succeeds only if the stored document is still active
///   and its `current_version_number` still equals `expected_current`. A
///   deleted document fails with `Deleted`, a moved counter with `Conflict`;
///   either way nothing is written.
/// - Version rows are never updated. They disappear only with their document
///   on `delete_document`.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new document together with its first version.
    async fn insert_document(&self, document: &Document, first: &Version) -> CatalogResult<()>;

    async fn get_document(&self, id: DocumentId) -> CatalogResult<Option<Document>>;

    /// Append `version` and replace the document's projection, guarded by a
    /// compare-and-swap on the current version number.
    async fn append_version(
        &self,
        expected_current: u32,
        document: &Document,
        version: &Version,
    ) -> CatalogResult<()>;

    /// Change a document's status. Returns `false` if no row matched.
    async fn set_status(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        status: DocumentStatus,
        at: DateTime<Utc>,
    ) -> CatalogResult<bool>;

    /// Remove a document and its versions. Returns the removed versions, or
    /// `None` if no row matched.
    async fn delete_document(
        &self,
        id: DocumentId,
        owner: &OwnerId,
    ) -> CatalogResult<Option<Vec<Version>>>;

    /// All documents, optionally restricted to one owner.
    async fn list_documents(&self, owner: Option<&OwnerId>) -> CatalogResult<Vec<Document>>;

    /// A document's versions in ascending version order.
    async fn list_versions(&self, id: DocumentId) -> CatalogResult<Vec<Version>>;

    async fn get_version(&self, id: DocumentId, number: u32) -> CatalogResult<Option<Version>>;

    /// Every storage key referenced by any version row.
    async fn referenced_keys(&self) -> CatalogResult<HashSet<ObjectKey>>;

    /// Whether any version row references `key`.
    async fn is_key_referenced(&self, key: &ObjectKey) -> CatalogResult<bool> {
        Ok(self.referenced_keys().await?.contains(key))
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use dossier_types::{Category, Document, DocumentId, ErrorType, ObjectKey, RelatedItemType, Version};

use crate::committer::CommitReceipt;
use crate::error::ServiceError;

/// Body returned for a successful upload or revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: DocumentId,
    pub version_number: u32,
    pub object_name: ObjectKey,
    pub bucket_name: String,
    pub url: String,
    pub metadata: UploadMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub original_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub file_extension: Option<String>,
    pub category: Category,
    pub related_item_id: Option<String>,
    pub related_item_type: Option<RelatedItemType>,
}

impl UploadResponse {
    pub fn new(document: &Document, version: &Version, receipt: CommitReceipt) -> Self {
        Self {
            id: document.id,
            version_number: version.version_number,
            object_name: receipt.key,
            bucket_name: receipt.bucket,
            url: receipt.url,
            metadata: UploadMetadata {
                original_name: receipt.original_name,
                mime_type: receipt.mime_type,
                file_size: receipt.size,
                file_extension: receipt.extension,
                category: document.category,
                related_item_id: document.related_item.as_ref().map(|r| r.id.clone()),
                related_item_type: document.related_item.as_ref().map(|r| r.item_type),
            },
        }
    }
}

/// Body returned for every failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    pub error_type: ErrorType,
}

impl FailureResponse {
    pub fn new(error: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_type,
        }
    }
}

impl From<&ServiceError> for FailureResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.to_string(), err.error_type())
    }
}

/// A freshly signed download URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub file_name: String,
    pub expires_in_secs: u64,
    pub expires_at: DateTime<Utc>,
}

/// What a hard delete removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub versions_removed: usize,
    pub objects_deleted: usize,
    /// Still referenced by another catalog row.
    pub objects_retained: usize,
    /// Delete failed; logged as orphans.
    pub objects_orphaned: usize,
}

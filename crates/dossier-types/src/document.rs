use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{Category, RelatedItem};
use crate::ids::{DocumentId, OwnerId, VersionId};
use crate::metadata::CategoryMetadata;
use crate::object::{ContentHash, ObjectKey};

/// Lifecycle state of a catalog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Catalog projection of a document.
///
/// `current_version_number`, `storage_key`, `file_name`, `file_size` and
/// `file_type` always mirror the highest version in the document's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub category: Category,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub metadata: CategoryMetadata,
    pub current_version_number: u32,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_key: ObjectKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_item: Option<RelatedItem>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_active(&self) -> bool {
        self.status == DocumentStatus::Active
    }

    /// Copy the mirrored file fields from `version` and advance the counter.
    pub fn apply_version(&mut self, version: &Version) {
        self.current_version_number = version.version_number;
        self.file_name = version.file_name.clone();
        self.file_size = version.file_size;
        self.file_type = version.mime_type.clone();
        self.storage_key = version.storage_key.clone();
        self.updated_at = version.created_at;
    }
}

/// Immutable record of one upload in a document's version chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub version_number: u32,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub storage_key: ObjectKey,
    pub content_hash: ContentHash,
    pub change_description: String,
    pub created_by: OwnerId,
    pub created_at: DateTime<Utc>,
}

/// File facts of a committed upload, ready to become a version record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVersion {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub storage_key: ObjectKey,
    pub content_hash: ContentHash,
    pub change_description: String,
    pub created_by: OwnerId,
}

impl NewVersion {
    /// Materialize as version `number` of `document_id`.
    pub fn into_version(self, document_id: DocumentId, number: u32, at: DateTime<Utc>) -> Version {
        Version {
            id: VersionId::new(),
            document_id,
            version_number: number,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            storage_key: self.storage_key,
            content_hash: self.content_hash,
            change_description: self.change_description,
            created_by: self.created_by,
            created_at: at,
        }
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use dossier_types::{Category, ContentHash, ObjectKey, OwnerId, RelatedItem};

use crate::error::StoreResult;

/// Descriptive metadata attached to a stored object.
///
/// Sent as object user metadata, so the store alone is enough to tell whose
/// object it is and what it was called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub original_name: String,
    pub file_extension: Option<String>,
    pub category: Category,
    pub owner_id: OwnerId,
    pub related_item: Option<RelatedItem>,
    pub content_hash: ContentHash,
}

impl ObjectMetadata {
    /// Header-safe key/value form. Non-ASCII characters in the original name
    /// are replaced because object metadata travels as HTTP headers.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("original-name".into(), header_safe(&self.original_name));
        if let Some(ext) = &self.file_extension {
            map.insert("file-extension".into(), header_safe(ext));
        }
        map.insert("category".into(), self.category.as_str().into());
        map.insert("owner-id".into(), header_safe(self.owner_id.as_str()));
        if let Some(item) = &self.related_item {
            map.insert("related-item-type".into(), item.item_type.as_str().into());
            map.insert("related-item-id".into(), header_safe(&item.id));
        }
        map.insert("content-hash".into(), self.content_hash.to_hex());
        map
    }
}

fn header_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

/// What the store reports about an existing object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: ObjectKey,
    pub size: u64,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// S3-compatible object store.
///
/// All implementations must satisfy these invariants:
/// - Construction performs no I/O; `ensure_bucket` is idempotent.
/// - `put_file` returns only after the store has acknowledged the write.
/// - `presign_get` has no side effects and needs no coordination.
/// - Errors are classified (connection / auth / bucket / unknown).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store writes to.
    fn bucket(&self) -> &str;

    /// Create the bucket if it does not exist.
    async fn ensure_bucket(&self) -> StoreResult<()>;

    /// Upload a local file under `key`.
    async fn put_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StoreResult<()>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;

    /// Stat an object. Returns `Ok(None)` if it does not exist.
    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectInfo>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Issue a time-limited GET URL. `download_name`, when given, is served
    /// as the attachment filename.
    async fn presign_get(
        &self,
        key: &ObjectKey,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> StoreResult<String>;

    /// List every key under `prefix`.
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<ObjectKey>>;
}

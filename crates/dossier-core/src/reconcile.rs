use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use dossier_catalog::DocumentRegistry;
use dossier_store::ObjectStore;
use dossier_types::ObjectKey;

use crate::error::ServiceResult;
use crate::ORPHAN_TARGET;

/// How a reconciliation pass selects and treats orphans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Only keys under this prefix are examined.
    pub prefix: String,
    /// Keys issued more recently than this may belong to a commit still in
    /// flight and are skipped.
    pub min_age: Duration,
    /// Delete orphans instead of only reporting them.
    pub delete: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            min_age: Duration::from_secs(15 * 60),
            delete: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub skipped_recent: usize,
    pub orphans: Vec<ObjectKey>,
    pub deleted: usize,
    pub failed: usize,
}

/// Find stored objects that no catalog version references.
///
/// The store is listed before the catalog is read, so an object recorded
/// while the pass runs is never reported.
pub async fn reconcile_orphans(
    store: &dyn ObjectStore,
    registry: &DocumentRegistry,
    options: &ReconcileOptions,
) -> ServiceResult<ReconcileReport> {
    let keys = store.list_keys(&options.prefix).await?;
    let referenced = registry.referenced_keys().await?;
    let cutoff = Utc::now() - chrono::Duration::from_std(options.min_age).unwrap_or(chrono::Duration::zero());

    let mut report = ReconcileReport {
        scanned: keys.len(),
        ..ReconcileReport::default()
    };
    for key in keys {
        if referenced.contains(&key) {
            continue;
        }
        if key.issued_at().is_some_and(|at| at > cutoff) {
            report.skipped_recent += 1;
            continue;
        }
        warn!(target: ORPHAN_TARGET, object_key = %key, bucket = store.bucket(), "unreferenced object");
        if options.delete {
            match store.delete(&key).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(object_key = %key, error = %e, "failed to delete orphan");
                    report.failed += 1;
                }
            }
        }
        report.orphans.push(key);
    }

    info!(
        bucket = store.bucket(),
        scanned = report.scanned,
        orphans = report.orphans.len(),
        deleted = report.deleted,
        "reconciliation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dossier_catalog::{DocumentDraft, InMemoryCatalog, VersionChainManager};
    use dossier_store::{InMemoryObjectStore, ObjectMetadata};
    use dossier_types::{Category, CategoryMetadata, ContentHash, NewVersion, OwnerId};

    fn metadata(owner: &OwnerId) -> ObjectMetadata {
        ObjectMetadata {
            original_name: "a.pdf".into(),
            file_extension: Some("pdf".into()),
            category: Category::Other,
            owner_id: owner.clone(),
            related_item: None,
            content_hash: ContentHash::of(b"a"),
        }
    }

    async fn put(store: &InMemoryObjectStore, key: &ObjectKey, owner: &OwnerId) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"a").unwrap();
        store
            .put_file(key, tmp.path(), "application/pdf", &metadata(owner))
            .await
            .unwrap();
    }

    async fn setup() -> (Arc<InMemoryObjectStore>, DocumentRegistry, ObjectKey, ObjectKey) {
        let owner = OwnerId::new("alice").unwrap();
        let store = Arc::new(InMemoryObjectStore::with_bucket("docs"));
        let registry = DocumentRegistry::new(Arc::new(InMemoryCatalog::new()));

        let recorded = ObjectKey::generate(Category::Other);
        put(&store, &recorded, &owner).await;
        let chain = VersionChainManager::new(registry.clone());
        let draft = DocumentDraft {
            owner: owner.clone(),
            category: Category::Other,
            title: "Notes".into(),
            description: None,
            tags: Default::default(),
            metadata: CategoryMetadata::empty(Category::Other),
            related_item: None,
        };
        chain
            .start(
                &draft,
                NewVersion {
                    file_name: "a.pdf".into(),
                    file_size: 1,
                    mime_type: "application/pdf".into(),
                    storage_key: recorded.clone(),
                    content_hash: ContentHash::of(b"a"),
                    change_description: "upload".into(),
                    created_by: owner.clone(),
                },
            )
            .await
            .unwrap();

        // Issued long ago, never recorded.
        let stale = ObjectKey::from_raw("other/legacy-orphan");
        put(&store, &stale, &owner).await;
        (store, registry, recorded, stale)
    }

    #[tokio::test]
    async fn reports_unreferenced_objects_only() {
        let (store, registry, _, stale) = setup().await;
        let report = reconcile_orphans(store.as_ref(), &registry, &ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.orphans, vec![stale.clone()]);
        assert_eq!(report.deleted, 0);
        assert!(store.contains(&stale));
    }

    #[tokio::test]
    async fn delete_removes_orphans() {
        let (store, registry, recorded, stale) = setup().await;
        let options = ReconcileOptions {
            delete: true,
            ..ReconcileOptions::default()
        };
        let report = reconcile_orphans(store.as_ref(), &registry, &options).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!store.contains(&stale));
        assert!(store.contains(&recorded));
    }

    #[tokio::test]
    async fn fresh_unrecorded_keys_are_skipped() {
        let (store, registry, _, _) = setup().await;
        let in_flight = ObjectKey::generate(Category::Other);
        put(&store, &in_flight, &OwnerId::new("bob").unwrap()).await;

        let report = reconcile_orphans(store.as_ref(), &registry, &ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(report.skipped_recent, 1);
        assert!(!report.orphans.contains(&in_flight));

        let eager = ReconcileOptions {
            min_age: Duration::ZERO,
            ..ReconcileOptions::default()
        };
        let report = reconcile_orphans(store.as_ref(), &registry, &eager).await.unwrap();
        assert!(report.orphans.contains(&in_flight));
    }
}

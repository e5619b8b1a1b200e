use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use dossier_types::{
    Category, CategoryMetadata, Document, DocumentId, DocumentStatus, ObjectKey, OwnerId,
    RelatedItem, ValidationError, Version,
};

use crate::error::{CatalogError, CatalogResult};
use crate::query::DocumentQuery;
use crate::traits::CatalogStore;

/// Caller-supplied descriptive fields of a new document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDraft {
    pub owner: OwnerId,
    pub category: Category,
    pub title: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub metadata: CategoryMetadata,
    pub related_item: Option<RelatedItem>,
}

impl DocumentDraft {
    /// Reject drafts the catalog must never hold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.metadata.category() != self.category {
            return Err(ValidationError::invalid(
                "metadata",
                format!(
                    "describes {} but the document is filed under {}",
                    self.metadata.category(),
                    self.category
                ),
            ));
        }
        Ok(())
    }

    /// Build the catalog projection whose mirrored fields come from `first`.
    pub fn into_document(self, id: DocumentId, first: &Version) -> Document {
        Document {
            id,
            owner_id: self.owner,
            category: self.category,
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            tags: self.tags,
            metadata: self.metadata,
            current_version_number: first.version_number,
            file_name: first.file_name.clone(),
            file_size: first.file_size,
            file_type: first.mime_type.clone(),
            storage_key: first.storage_key.clone(),
            related_item: self.related_item,
            status: DocumentStatus::Active,
            created_at: first.created_at,
            updated_at: first.created_at,
        }
    }
}

/// Owner-scoped view over the catalog.
///
/// A document that exists but belongs to someone else is reported as not
/// found. Lists return newest first.
#[derive(Clone)]
pub struct DocumentRegistry {
    store: Arc<dyn CatalogStore>,
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Insert a document and its first version as one atomic write.
    pub async fn create(&self, document: &Document, first: &Version) -> CatalogResult<()> {
        self.store.insert_document(document, first).await?;
        info!(
            document = %document.id,
            owner = %document.owner_id,
            category = %document.category,
            "document created"
        );
        Ok(())
    }

    /// Fetch a document owned by `owner`, including soft-deleted ones.
    pub async fn get(&self, id: DocumentId, owner: &OwnerId) -> CatalogResult<Document> {
        match self.store.get_document(id).await? {
            Some(doc) if &doc.owner_id == owner => Ok(doc),
            _ => Err(CatalogError::NotFound(id)),
        }
    }

    pub async fn query(&self, query: &DocumentQuery) -> CatalogResult<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .store
            .list_documents(query.owner.as_ref())
            .await?
            .into_iter()
            .filter(|d| query.matches(d))
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        debug!(results = docs.len(), "catalog query");
        Ok(docs)
    }

    pub async fn list_by_owner(&self, owner: &OwnerId) -> CatalogResult<Vec<Document>> {
        self.query(&DocumentQuery::new().owned_by(owner.clone())).await
    }

    pub async fn list_by_category(
        &self,
        owner: &OwnerId,
        category: Category,
    ) -> CatalogResult<Vec<Document>> {
        self.query(&DocumentQuery::new().owned_by(owner.clone()).in_category(category))
            .await
    }

    pub async fn list_by_related_item(
        &self,
        owner: &OwnerId,
        item: &RelatedItem,
    ) -> CatalogResult<Vec<Document>> {
        self.query(&DocumentQuery::new().owned_by(owner.clone()).related_to(item))
            .await
    }

    pub async fn search(&self, owner: &OwnerId, text: &str) -> CatalogResult<Vec<Document>> {
        self.query(&DocumentQuery::new().owned_by(owner.clone()).matching(text))
            .await
    }

    /// Mark a document deleted. Its versions and objects are kept.
    pub async fn soft_delete(&self, id: DocumentId, owner: &OwnerId) -> CatalogResult<Document> {
        self.set_status(id, owner, DocumentStatus::Deleted).await
    }

    /// Undo a soft delete.
    pub async fn restore(&self, id: DocumentId, owner: &OwnerId) -> CatalogResult<Document> {
        self.set_status(id, owner, DocumentStatus::Active).await
    }

    async fn set_status(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        status: DocumentStatus,
    ) -> CatalogResult<Document> {
        let doc = self.get(id, owner).await?;
        if doc.status == status {
            return Ok(doc);
        }
        if !self.store.set_status(id, owner, status, Utc::now()).await? {
            return Err(CatalogError::NotFound(id));
        }
        info!(document = %id, status = status.as_str(), "document status changed");
        self.get(id, owner).await
    }

    /// Remove a document and all its version rows. Returns the removed
    /// versions so the caller can reclaim their objects.
    pub async fn hard_delete(&self, id: DocumentId, owner: &OwnerId) -> CatalogResult<Vec<Version>> {
        let removed = self
            .store
            .delete_document(id, owner)
            .await?
            .ok_or(CatalogError::NotFound(id))?;
        info!(document = %id, versions = removed.len(), "document purged");
        Ok(removed)
    }

    pub async fn is_key_referenced(&self, key: &ObjectKey) -> CatalogResult<bool> {
        self.store.is_key_referenced(key).await
    }

    pub async fn referenced_keys(&self) -> CatalogResult<HashSet<ObjectKey>> {
        self.store.referenced_keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCatalog;
    use crate::sqlite::SqliteCatalog;
    use crate::testing::{draft, new_version, owner, sample_document};
    use dossier_types::RelatedItemType;

    fn registry() -> DocumentRegistry {
        DocumentRegistry::new(Arc::new(InMemoryCatalog::new()))
    }

    async fn seed(registry: &DocumentRegistry, owner: &OwnerId, category: Category, title: &str) -> Document {
        let id = DocumentId::new();
        let first = new_version(owner, category, &format!("{title}.pdf")).into_version(id, 1, Utc::now());
        let doc = draft(owner, category, title).into_document(id, &first);
        registry.create(&doc, &first).await.unwrap();
        doc
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    #[test]
    fn draft_requires_title_and_matching_metadata() {
        let alice = owner("alice");
        assert!(draft(&alice, Category::Research, "Proposal").validate().is_ok());
        assert_eq!(
            draft(&alice, Category::Research, "  ").validate(),
            Err(ValidationError::MissingField("title"))
        );
        let mut d = draft(&alice, Category::Research, "Proposal");
        d.metadata = CategoryMetadata::empty(Category::Publication);
        assert!(matches!(
            d.validate(),
            Err(ValidationError::InvalidField { field: "metadata", .. })
        ));
    }

    // =========================================================================
    // Lookup and listing
    // =========================================================================

    #[tokio::test]
    async fn get_hides_other_owners_documents() {
        let registry = registry();
        let doc = seed(&registry, &owner("alice"), Category::Research, "Proposal").await;

        assert_eq!(registry.get(doc.id, &owner("alice")).await.unwrap().id, doc.id);
        let err = registry.get(doc.id, &owner("bob")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn lists_are_owner_scoped_and_filtered() {
        let registry = registry();
        let alice = owner("alice");
        seed(&registry, &alice, Category::Research, "Proposal").await;
        seed(&registry, &alice, Category::Publication, "Journal article").await;
        seed(&registry, &owner("bob"), Category::Research, "Other proposal").await;

        assert_eq!(registry.list_by_owner(&alice).await.unwrap().len(), 2);
        let research = registry.list_by_category(&alice, Category::Research).await.unwrap();
        assert_eq!(research.len(), 1);
        assert_eq!(research[0].title, "Proposal");

        let found = registry.search(&alice, "JOURNAL").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, Category::Publication);
    }

    #[tokio::test]
    async fn list_by_related_item() {
        let registry = registry();
        let alice = owner("alice");
        let (doc, v1) = sample_document(&alice);
        registry.create(&doc, &v1).await.unwrap();
        seed(&registry, &alice, Category::Research, "Unrelated").await;

        let item = RelatedItem::new(RelatedItemType::ResearchProject, "rp-17");
        let docs = registry.list_by_related_item(&alice, &item).await.unwrap();
        assert_eq!(docs.iter().map(|d| d.id).collect::<Vec<_>>(), vec![doc.id]);
    }

    #[tokio::test]
    async fn lists_are_newest_first() {
        let registry = registry();
        let alice = owner("alice");
        let first = seed(&registry, &alice, Category::Other, "first").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = seed(&registry, &alice, Category::Other, "second").await;

        let ids: Vec<_> = registry.list_by_owner(&alice).await.unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn soft_delete_hides_from_lists_and_restore_brings_back() {
        let registry = registry();
        let alice = owner("alice");
        let doc = seed(&registry, &alice, Category::Research, "Proposal").await;

        let deleted = registry.soft_delete(doc.id, &alice).await.unwrap();
        assert_eq!(deleted.status, DocumentStatus::Deleted);
        assert!(registry.list_by_owner(&alice).await.unwrap().is_empty());
        // Still reachable by id.
        assert!(registry.get(doc.id, &alice).await.is_ok());

        // Idempotent.
        registry.soft_delete(doc.id, &alice).await.unwrap();

        let restored = registry.restore(doc.id, &alice).await.unwrap();
        assert!(restored.is_active());
        assert_eq!(registry.list_by_owner(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_by_another_owner_is_not_found() {
        let registry = registry();
        let doc = seed(&registry, &owner("alice"), Category::Research, "Proposal").await;
        let err = registry.soft_delete(doc.id, &owner("bob")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn hard_delete_returns_removed_versions() {
        let registry = DocumentRegistry::new(Arc::new(SqliteCatalog::in_memory().await.unwrap()));
        let alice = owner("alice");
        let doc = seed(&registry, &alice, Category::Research, "Proposal").await;
        assert!(registry.is_key_referenced(&doc.storage_key).await.unwrap());

        let removed = registry.hard_delete(doc.id, &alice).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].storage_key, doc.storage_key);
        assert!(!registry.is_key_referenced(&doc.storage_key).await.unwrap());

        let err = registry.hard_delete(doc.id, &alice).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}

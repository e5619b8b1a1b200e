use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dossier_types::{Document, DocumentId, DocumentStatus, ObjectKey, OwnerId, Version};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::CatalogStore;

#[derive(Default)]
struct State {
    documents: HashMap<DocumentId, Document>,
    versions: HashMap<DocumentId, Vec<Version>>,
}

/// In-memory catalog for tests and development.
///
/// A single lock guards documents and versions together, so every method is
/// atomic in the same way a database transaction would be.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents, any status.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.documents.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> CatalogError {
    CatalogError::Storage(format!("lock poisoned: {e}"))
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn insert_document(&self, document: &Document, first: &Version) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if let Some(existing) = state.documents.get(&document.id) {
            return Err(CatalogError::Conflict {
                id: document.id,
                expected: 0,
                actual: existing.current_version_number,
            });
        }
        state.documents.insert(document.id, document.clone());
        state.versions.insert(document.id, vec![first.clone()]);
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> CatalogResult<Option<Document>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.documents.get(&id).cloned())
    }

    async fn append_version(
        &self,
        expected_current: u32,
        document: &Document,
        version: &Version,
    ) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = state
            .documents
            .get_mut(&document.id)
            .ok_or(CatalogError::NotFound(document.id))?;
        if !stored.is_active() {
            return Err(CatalogError::Deleted(document.id));
        }
        if stored.current_version_number != expected_current {
            return Err(CatalogError::Conflict {
                id: document.id,
                expected: expected_current,
                actual: stored.current_version_number,
            });
        }
        *stored = document.clone();
        state
            .versions
            .entry(document.id)
            .or_default()
            .push(version.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        status: DocumentStatus,
        at: DateTime<Utc>,
    ) -> CatalogResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        match state.documents.get_mut(&id) {
            Some(doc) if &doc.owner_id == owner => {
                doc.status = status;
                doc.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_document(
        &self,
        id: DocumentId,
        owner: &OwnerId,
    ) -> CatalogResult<Option<Vec<Version>>> {
        let mut state = self.state.write().map_err(poisoned)?;
        match state.documents.get(&id) {
            Some(doc) if &doc.owner_id == owner => {}
            _ => return Ok(None),
        }
        state.documents.remove(&id);
        Ok(Some(state.versions.remove(&id).unwrap_or_default()))
    }

    async fn list_documents(&self, owner: Option<&OwnerId>) -> CatalogResult<Vec<Document>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .documents
            .values()
            .filter(|d| owner.map_or(true, |o| &d.owner_id == o))
            .cloned()
            .collect())
    }

    async fn list_versions(&self, id: DocumentId) -> CatalogResult<Vec<Version>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut versions = state.versions.get(&id).cloned().unwrap_or_default();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn get_version(&self, id: DocumentId, number: u32) -> CatalogResult<Option<Version>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .versions
            .get(&id)
            .and_then(|vs| vs.iter().find(|v| v.version_number == number))
            .cloned())
    }

    async fn referenced_keys(&self) -> CatalogResult<HashSet<ObjectKey>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .versions
            .values()
            .flatten()
            .map(|v| v.storage_key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{first_version_of, owner, sample_document};

    #[tokio::test]
    async fn insert_then_get() {
        let catalog = InMemoryCatalog::new();
        let (doc, v1) = sample_document(&owner("alice"));
        catalog.insert_document(&doc, &v1).await.unwrap();

        assert_eq!(catalog.get_document(doc.id).await.unwrap(), Some(doc.clone()));
        assert_eq!(catalog.list_versions(doc.id).await.unwrap(), vec![v1]);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let catalog = InMemoryCatalog::new();
        let (doc, v1) = sample_document(&owner("alice"));
        catalog.insert_document(&doc, &v1).await.unwrap();
        let err = catalog.insert_document(&doc, &v1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { expected: 0, actual: 1, .. }));
    }

    #[tokio::test]
    async fn stale_append_writes_nothing() {
        let catalog = InMemoryCatalog::new();
        let (doc, v1) = sample_document(&owner("alice"));
        catalog.insert_document(&doc, &v1).await.unwrap();

        let v2 = first_version_of(&doc, "rev.pdf").into_version(doc.id, 2, Utc::now());
        let mut next = doc.clone();
        next.apply_version(&v2);

        let err = catalog.append_version(0, &next, &v2).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { expected: 0, actual: 1, .. }));
        assert_eq!(catalog.list_versions(doc.id).await.unwrap().len(), 1);

        catalog.append_version(1, &next, &v2).await.unwrap();
        let stored = catalog.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.current_version_number, 2);
        assert_eq!(stored.storage_key, v2.storage_key);
    }

    #[tokio::test]
    async fn append_to_deleted_document_is_refused() {
        let catalog = InMemoryCatalog::new();
        let alice = owner("alice");
        let (doc, v1) = sample_document(&alice);
        catalog.insert_document(&doc, &v1).await.unwrap();
        catalog
            .set_status(doc.id, &alice, DocumentStatus::Deleted, Utc::now())
            .await
            .unwrap();

        let v2 = first_version_of(&doc, "rev.pdf").into_version(doc.id, 2, Utc::now());
        let mut next = doc.clone();
        next.apply_version(&v2);
        let err = catalog.append_version(1, &next, &v2).await.unwrap_err();
        assert!(matches!(err, CatalogError::Deleted(id) if id == doc.id));

        let stored = catalog.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Deleted);
        assert_eq!(stored.current_version_number, 1);
        assert_eq!(catalog.list_versions(doc.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_and_delete_are_owner_scoped() {
        let catalog = InMemoryCatalog::new();
        let (doc, v1) = sample_document(&owner("alice"));
        catalog.insert_document(&doc, &v1).await.unwrap();

        let mallory = owner("mallory");
        assert!(!catalog
            .set_status(doc.id, &mallory, DocumentStatus::Deleted, Utc::now())
            .await
            .unwrap());
        assert!(catalog.delete_document(doc.id, &mallory).await.unwrap().is_none());

        let removed = catalog.delete_document(doc.id, &owner("alice")).await.unwrap();
        assert_eq!(removed.map(|v| v.len()), Some(1));
        assert!(catalog.is_empty());
        assert!(!catalog.is_key_referenced(&v1.storage_key).await.unwrap());
    }
}

use chrono::Utc;
use tracing::{debug, warn};

use dossier_types::{Document, DocumentId, NewVersion, OwnerId, Version};

use crate::error::{CatalogError, CatalogResult};
use crate::registry::{DocumentDraft, DocumentRegistry};

/// Default number of compare-and-swap attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Allocates version numbers and records committed uploads.
///
/// Numbers come from a compare-and-swap on the document's
/// `current_version_number`: read `n`, write version `n + 1` only if the
/// counter is still `n`, otherwise re-read and try again. Concurrent writers to
/// one document therefore produce exactly `1..=N` with no gaps or duplicates.
///
/// Callers must only record versions whose object is already in the store.
#[derive(Clone)]
pub struct VersionChainManager {
    registry: DocumentRegistry,
    max_attempts: u32,
}

impl VersionChainManager {
    pub fn new(registry: DocumentRegistry) -> Self {
        Self {
            registry,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Create a new document whose first version is `version`.
    pub async fn start(
        &self,
        draft: &DocumentDraft,
        version: NewVersion,
    ) -> CatalogResult<(Document, Version)> {
        self.record(DocumentId::new(), draft, version).await
    }

    /// Record `version` against document `id`, creating the document from
    /// `draft` if it does not exist yet.
    pub async fn record(
        &self,
        id: DocumentId,
        draft: &DocumentDraft,
        version: NewVersion,
    ) -> CatalogResult<(Document, Version)> {
        self.allocate(id, &draft.owner, Some(draft), version).await
    }

    /// Append `version` to an existing document owned by `owner`.
    pub async fn append(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        version: NewVersion,
    ) -> CatalogResult<(Document, Version)> {
        self.allocate(id, owner, None, version).await
    }

    /// A document's versions, newest first.
    pub async fn list_versions(&self, id: DocumentId, owner: &OwnerId) -> CatalogResult<Vec<Version>> {
        self.registry.get(id, owner).await?;
        let mut versions = self.registry.store().list_versions(id).await?;
        versions.reverse();
        Ok(versions)
    }

    pub async fn get_version(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        number: u32,
    ) -> CatalogResult<Version> {
        self.registry.get(id, owner).await?;
        self.registry
            .store()
            .get_version(id, number)
            .await?
            .ok_or(CatalogError::VersionNotFound { id, version: number })
    }

    async fn allocate(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        draft: Option<&DocumentDraft>,
        version: NewVersion,
    ) -> CatalogResult<(Document, Version)> {
        let store = self.registry.store();
        for attempt in 1..=self.max_attempts {
            let now = Utc::now();
            let conflict = match store.get_document(id).await? {
                None => {
                    let Some(draft) = draft else {
                        return Err(CatalogError::NotFound(id));
                    };
                    let first = version.clone().into_version(id, 1, now);
                    let doc = draft.clone().into_document(id, &first);
                    match self.registry.create(&doc, &first).await {
                        Ok(()) => return Ok((doc, first)),
                        Err(e @ CatalogError::Conflict { .. }) => e,
                        Err(e) => return Err(e),
                    }
                }
                Some(doc) => {
                    if &doc.owner_id != owner {
                        return Err(CatalogError::NotFound(id));
                    }
                    if !doc.is_active() {
                        return Err(CatalogError::Deleted(id));
                    }
                    let expected = doc.current_version_number;
                    let next = version.clone().into_version(id, expected + 1, now);
                    let mut updated = doc;
                    updated.apply_version(&next);
                    match store.append_version(expected, &updated, &next).await {
                        Ok(()) => {
                            debug!(document = %id, version = next.version_number, attempt, "version recorded");
                            return Ok((updated, next));
                        }
                        Err(e @ CatalogError::Conflict { .. }) => e,
                        Err(e) => return Err(e),
                    }
                }
            };
            debug!(document = %id, attempt, error = %conflict, "version allocation lost a race, retrying");
            tokio::task::yield_now().await;
        }
        warn!(document = %id, attempts = self.max_attempts, "version allocation exhausted retries");
        Err(CatalogError::Contention {
            id,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::memory::InMemoryCatalog;
    use crate::sqlite::SqliteCatalog;
    use crate::testing::{draft, new_version, owner};
    use crate::traits::CatalogStore;
    use dossier_types::Category;

    fn chain_over(store: Arc<dyn CatalogStore>) -> VersionChainManager {
        VersionChainManager::new(DocumentRegistry::new(store))
    }

    fn chain() -> VersionChainManager {
        chain_over(Arc::new(InMemoryCatalog::new()))
    }

    #[tokio::test]
    async fn start_creates_version_one() {
        let chain = chain();
        let alice = owner("alice");
        let v = new_version(&alice, Category::Research, "proposal.pdf");
        let (doc, v1) = chain
            .start(&draft(&alice, Category::Research, "Proposal"), v.clone())
            .await
            .unwrap();

        assert_eq!(v1.version_number, 1);
        assert_eq!(doc.current_version_number, 1);
        assert_eq!(doc.storage_key, v.storage_key);
        assert_eq!(doc.file_name, "proposal.pdf");
    }

    #[tokio::test]
    async fn append_advances_and_mirrors() {
        let chain = chain();
        let alice = owner("alice");
        let (doc, _) = chain
            .start(
                &draft(&alice, Category::Research, "Proposal"),
                new_version(&alice, Category::Research, "proposal.pdf"),
            )
            .await
            .unwrap();

        let rev = new_version(&alice, Category::Research, "proposal-v2.pdf");
        let (updated, v2) = chain.append(doc.id, &alice, rev.clone()).await.unwrap();
        assert_eq!(v2.version_number, 2);
        assert_eq!(updated.current_version_number, 2);
        assert_eq!(updated.storage_key, rev.storage_key);
        assert_eq!(updated.file_name, "proposal-v2.pdf");
        assert_eq!(updated.created_at, doc.created_at);

        let stored = chain.registry().get(doc.id, &alice).await.unwrap();
        assert_eq!(stored, updated);

        let numbers: Vec<u32> = chain
            .list_versions(doc.id, &alice)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![2, 1]);
        assert_eq!(chain.get_version(doc.id, &alice, 1).await.unwrap().file_name, "proposal.pdf");
    }

    #[tokio::test]
    async fn append_checks_existence_owner_and_status() {
        let chain = chain();
        let alice = owner("alice");
        let rev = || new_version(&alice, Category::Research, "rev.pdf");

        let err = chain.append(DocumentId::new(), &alice, rev()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let (doc, _) = chain
            .start(&draft(&alice, Category::Research, "Proposal"), rev())
            .await
            .unwrap();
        let err = chain.append(doc.id, &owner("bob"), rev()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        chain.registry().soft_delete(doc.id, &alice).await.unwrap();
        let err = chain.append(doc.id, &alice, rev()).await.unwrap_err();
        assert!(matches!(err, CatalogError::Deleted(_)));
    }

    #[tokio::test]
    async fn missing_version_is_reported() {
        let chain = chain();
        let alice = owner("alice");
        let (doc, _) = chain
            .start(
                &draft(&alice, Category::Other, "Notes"),
                new_version(&alice, Category::Other, "notes.txt"),
            )
            .await
            .unwrap();
        let err = chain.get_version(doc.id, &alice, 7).await.unwrap_err();
        assert!(matches!(err, CatalogError::VersionNotFound { version: 7, .. }));
    }

    async fn concurrent_commits_number_contiguously(chain: VersionChainManager, k: u32) {
        let alice = owner("alice");
        let id = DocumentId::new();
        let draft = draft(&alice, Category::Research, "Proposal");

        let tasks: Vec<_> = (0..k)
            .map(|i| {
                let chain = chain.clone();
                let draft = draft.clone();
                let version = new_version(&alice, Category::Research, &format!("rev-{i}.pdf"));
                tokio::spawn(async move { chain.record(id, &draft, version).await })
            })
            .collect();

        let mut numbers = Vec::new();
        for task in tasks {
            let (_, version) = task.await.unwrap().unwrap();
            numbers.push(version.version_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=k).collect::<Vec<_>>());

        let doc = chain.registry().get(id, &alice).await.unwrap();
        assert_eq!(doc.current_version_number, k);
        let newest = chain.get_version(id, &alice, k).await.unwrap();
        assert_eq!(doc.storage_key, newest.storage_key);
        assert_eq!(doc.file_name, newest.file_name);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_in_memory() {
        concurrent_commits_number_contiguously(chain(), 16).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_sqlite() {
        let store = SqliteCatalog::in_memory().await.unwrap();
        concurrent_commits_number_contiguously(chain_over(Arc::new(store)), 8).await;
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info, warn};

use dossier_catalog::{
    CatalogError, CatalogStore, DocumentDraft, DocumentQuery, DocumentRegistry, VersionChainManager,
};
use dossier_staging::{Stager, StagingHandle};
use dossier_store::ObjectStore;
use dossier_types::{Document, DocumentId, NewVersion, ObjectKey, OwnerId, Version};

use crate::bucket::BucketGuard;
use crate::committer::{CommitPolicy, CommitReceipt, CommitTarget, Committer};
use crate::error::{ServiceError, ServiceResult};
use crate::outcome::{PresignedUrl, PurgeReport, UploadResponse};
use crate::retrieval::{download_name, RetrievalService};
use crate::ORPHAN_TARGET;

const INITIAL_UPLOAD: &str = "Initial upload";
const REVISED_UPLOAD: &str = "Revised upload";

/// A new document and the note recorded on its first version.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub draft: DocumentDraft,
    pub change_description: Option<String>,
}

/// A new version of an existing document.
#[derive(Clone, Debug, Default)]
pub struct RevisionRequest {
    pub change_description: Option<String>,
}

fn describe(note: Option<String>, fallback: &str) -> String {
    note.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Entry point for every document operation.
///
/// Owns the three upload phases and the read side. Store and catalog are
/// trait objects so tests run against the in-memory doubles.
pub struct DocumentService {
    stager: Stager,
    committer: Committer,
    chain: VersionChainManager,
    retrieval: RetrievalService,
    store: Arc<dyn ObjectStore>,
    bucket: Arc<BucketGuard>,
}

impl DocumentService {
    pub fn new(
        stager: Stager,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogStore>,
        policy: CommitPolicy,
    ) -> Self {
        let bucket = Arc::new(BucketGuard::new(store.clone()));
        let retrieval = RetrievalService::new(store.clone(), policy.presign_expiry);
        Self {
            stager,
            committer: Committer::new(store.clone(), bucket.clone(), policy),
            chain: VersionChainManager::new(DocumentRegistry::new(catalog)),
            retrieval,
            store,
            bucket,
        }
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn registry(&self) -> &DocumentRegistry {
        self.chain.registry()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn bucket_ready(&self) -> bool {
        self.bucket.is_ready()
    }

    /// Startup bucket check. Never fails; a miss is retried on first upload.
    pub async fn warm_up(&self) {
        self.bucket.warm_up().await;
    }

    // -------------------------------------------------------------------------
    // Uploads
    // -------------------------------------------------------------------------

    /// Stage a buffered upload and record it as a new document.
    pub async fn upload(
        &self,
        request: UploadRequest,
        file_name: &str,
        declared_mime: Option<&str>,
        data: Bytes,
    ) -> ServiceResult<UploadResponse> {
        request.draft.validate()?;
        let staged = self.stager.stage(file_name, declared_mime, data).await?;
        self.upload_staged(request, staged).await
    }

    /// Commit an already staged file as version 1 of a new document.
    pub async fn upload_staged(
        &self,
        request: UploadRequest,
        staged: StagingHandle,
    ) -> ServiceResult<UploadResponse> {
        if let Err(e) = request.draft.validate() {
            discard(&staged).await;
            return Err(e.into());
        }
        let UploadRequest {
            draft,
            change_description,
        } = request;
        let target = CommitTarget {
            category: draft.category,
            owner: draft.owner.clone(),
            related_item: draft.related_item.clone(),
        };

        let receipt = self.committer.commit(&staged, &target).await?;
        let version = new_version(&receipt, &draft.owner, describe(change_description, INITIAL_UPLOAD));
        match self.chain.start(&draft, version).await {
            Ok((document, version)) => Ok(UploadResponse::new(&document, &version, receipt)),
            Err(e) => Err(self.orphaned(receipt.key, &draft.owner, e)),
        }
    }

    /// Stage a buffered upload and record it as the next version of `id`.
    pub async fn revise(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        request: RevisionRequest,
        file_name: &str,
        declared_mime: Option<&str>,
        data: Bytes,
    ) -> ServiceResult<UploadResponse> {
        let staged = self.stager.stage(file_name, declared_mime, data).await?;
        self.revise_staged(id, owner, request, staged).await
    }

    /// Commit an already staged file as the next version of `id`.
    pub async fn revise_staged(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        request: RevisionRequest,
        staged: StagingHandle,
    ) -> ServiceResult<UploadResponse> {
        // Nothing is stored for a document the caller cannot revise.
        let document = match self.registry().get(id, owner).await {
            Ok(doc) if doc.is_active() => doc,
            Ok(_) => {
                discard(&staged).await;
                return Err(CatalogError::Deleted(id).into());
            }
            Err(e) => {
                discard(&staged).await;
                return Err(e.into());
            }
        };
        let target = CommitTarget {
            category: document.category,
            owner: owner.clone(),
            related_item: document.related_item.clone(),
        };

        let receipt = self.committer.commit(&staged, &target).await?;
        let version = new_version(&receipt, owner, describe(request.change_description, REVISED_UPLOAD));
        match self.chain.append(id, owner, version).await {
            Ok((document, version)) => Ok(UploadResponse::new(&document, &version, receipt)),
            Err(e) => Err(self.orphaned(receipt.key, owner, e)),
        }
    }

    fn orphaned(&self, key: ObjectKey, owner: &OwnerId, source: CatalogError) -> ServiceError {
        error!(
            target: ORPHAN_TARGET,
            object_key = %key,
            bucket = self.store.bucket(),
            owner_id = %owner,
            error = %source,
            "object stored but catalog write failed"
        );
        ServiceError::Orphaned { key, source }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get(&self, id: DocumentId, owner: &OwnerId) -> ServiceResult<Document> {
        Ok(self.registry().get(id, owner).await?)
    }

    pub async fn list(&self, query: &DocumentQuery) -> ServiceResult<Vec<Document>> {
        Ok(self.registry().query(query).await?)
    }

    /// Version history, newest first.
    pub async fn versions(&self, id: DocumentId, owner: &OwnerId) -> ServiceResult<Vec<Version>> {
        Ok(self.chain.list_versions(id, owner).await?)
    }

    pub async fn version(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        number: u32,
    ) -> ServiceResult<Version> {
        Ok(self.chain.get_version(id, owner, number).await?)
    }

    /// Fresh download URL for the current version, or for `version` if given.
    pub async fn presign(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        version: Option<u32>,
        expires_in: Option<Duration>,
    ) -> ServiceResult<PresignedUrl> {
        let number = match version {
            Some(n) => n,
            None => self.registry().get(id, owner).await?.current_version_number,
        };
        let version = self.chain.get_version(id, owner, number).await?;
        let name = download_name(&version.file_name, None);
        Ok(self
            .retrieval
            .presign(&version.storage_key, &name, expires_in)
            .await?)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub async fn soft_delete(&self, id: DocumentId, owner: &OwnerId) -> ServiceResult<Document> {
        Ok(self.registry().soft_delete(id, owner).await?)
    }

    pub async fn restore(&self, id: DocumentId, owner: &OwnerId) -> ServiceResult<Document> {
        Ok(self.registry().restore(id, owner).await?)
    }

    /// Remove a document, its versions, and every object no other catalog
    /// row still references. The catalog goes first; an object that cannot
    /// be deleted afterwards is logged as an orphan, not reported as failure.
    pub async fn hard_delete(&self, id: DocumentId, owner: &OwnerId) -> ServiceResult<PurgeReport> {
        let removed = self.registry().hard_delete(id, owner).await?;
        let mut report = PurgeReport {
            versions_removed: removed.len(),
            ..PurgeReport::default()
        };

        let keys: BTreeSet<ObjectKey> = removed.into_iter().map(|v| v.storage_key).collect();
        for key in keys {
            match self.registry().is_key_referenced(&key).await {
                Ok(true) => {
                    report.objects_retained += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(object_key = %key, error = %e, "cannot confirm object is unreferenced; keeping it");
                    report.objects_retained += 1;
                    continue;
                }
            }
            match self.store.delete(&key).await {
                Ok(()) => report.objects_deleted += 1,
                Err(e) => {
                    error!(
                        target: ORPHAN_TARGET,
                        object_key = %key,
                        bucket = self.store.bucket(),
                        owner_id = %owner,
                        error = %e,
                        "purged document's object could not be deleted"
                    );
                    report.objects_orphaned += 1;
                }
            }
        }
        info!(
            document = %id,
            versions = report.versions_removed,
            objects_deleted = report.objects_deleted,
            "document hard-deleted"
        );
        Ok(report)
    }
}

fn new_version(receipt: &CommitReceipt, owner: &OwnerId, change_description: String) -> NewVersion {
    NewVersion {
        file_name: receipt.original_name.clone(),
        file_size: receipt.size,
        mime_type: receipt.mime_type.clone(),
        storage_key: receipt.key.clone(),
        content_hash: receipt.content_hash,
        change_description,
        created_by: owner.clone(),
    }
}

async fn discard(staged: &StagingHandle) {
    if let Err(e) = staged.discard().await {
        warn!(staging_id = %staged.id, error = %e, "staging file not removed; sweep will reclaim it");
    }
}

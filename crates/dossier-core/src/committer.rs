use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use dossier_staging::{resolve_mime_type, StagingHandle};
use dossier_store::{ObjectMetadata, ObjectStore, ObjectStoreConfig, StoreError, StoreResult};
use dossier_types::{Category, ContentHash, ObjectKey, OwnerId, RelatedItem};

use crate::bucket::BucketGuard;
use crate::ORPHAN_TARGET;

/// Timing and retry behavior of a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Deadline for each store call; exceeding it is a connection failure.
    pub timeout: Duration,
    /// Extra attempts after a transient failure.
    pub retries: u32,
    /// Pause before retry `n` is `backoff * n`.
    pub backoff: Duration,
    /// Validity of the URL issued with the commit.
    pub presign_expiry: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self::from_config(&ObjectStoreConfig::default())
    }
}

impl CommitPolicy {
    pub fn from_config(config: &ObjectStoreConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            retries: config.commit_retries,
            backoff: Duration::from_millis(250),
            presign_expiry: config.presign_expiry(),
        }
    }
}

/// Who the object belongs to and where it is filed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitTarget {
    pub category: Category,
    pub owner: OwnerId,
    pub related_item: Option<RelatedItem>,
}

/// Proof that an object is durably in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub key: ObjectKey,
    pub bucket: String,
    pub url: String,
    pub original_name: String,
    pub extension: Option<String>,
    pub mime_type: String,
    pub size: u64,
    pub content_hash: ContentHash,
}

/// Second phase of the upload pipeline: staged file to object store.
pub struct Committer {
    store: Arc<dyn ObjectStore>,
    bucket: Arc<BucketGuard>,
    policy: CommitPolicy,
}

impl Committer {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: Arc<BucketGuard>, policy: CommitPolicy) -> Self {
        Self {
            store,
            bucket,
            policy,
        }
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    /// Upload the staged file under a fresh key and issue a download URL.
    ///
    /// The staging file is removed once the store has the object. On failure
    /// it is removed too; nothing is left for the catalog to reference.
    pub async fn commit(
        &self,
        staged: &StagingHandle,
        target: &CommitTarget,
    ) -> StoreResult<CommitReceipt> {
        let result = self.try_commit(staged, target).await;
        if let Err(e) = staged.discard().await {
            warn!(staging_id = %staged.id, error = %e, "staging file not removed; sweep will reclaim it");
        }
        result
    }

    async fn try_commit(
        &self,
        staged: &StagingHandle,
        target: &CommitTarget,
    ) -> StoreResult<CommitReceipt> {
        let data = tokio::fs::read(staged.path()).await?;
        let content_hash = ContentHash::of(&data);
        drop(data);

        self.timed(self.bucket.ensure()).await?;

        let key = ObjectKey::generate(target.category);
        let mime_type = resolve_mime_type(&staged.original_name, Some(&staged.mime_type));
        let extension = staged.extension();
        let metadata = ObjectMetadata {
            original_name: staged.original_name.clone(),
            file_extension: extension.clone(),
            category: target.category,
            owner_id: target.owner.clone(),
            related_item: target.related_item.clone(),
            content_hash,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let put = self.store.put_file(&key, staged.path(), &mime_type, &metadata);
            match self.timed(put).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt <= self.policy.retries => {
                    let pause = self.policy.backoff * attempt;
                    warn!(
                        object_key = %key,
                        attempt,
                        retry_in_ms = pause.as_millis() as u64,
                        error = %e,
                        "commit failed, retrying"
                    );
                    tokio::time::sleep(pause).await;
                }
                Err(e) => {
                    warn!(object_key = %key, attempt, error_type = %e.error_type(), error = %e, "commit failed");
                    return Err(e);
                }
            }
        }

        let download = crate::retrieval::download_name(&staged.original_name, extension.as_deref());
        let presign = self
            .store
            .presign_get(&key, self.policy.presign_expiry, Some(&download));
        let url = match self.timed(presign).await {
            Ok(url) => url,
            Err(e) => {
                self.abandon(&key, &target.owner).await;
                return Err(e);
            }
        };

        info!(
            object_key = %key,
            staging_id = %staged.id,
            size = staged.size,
            mime_type = %mime_type,
            "object committed"
        );
        Ok(CommitReceipt {
            key,
            bucket: self.store.bucket().to_string(),
            url,
            original_name: staged.original_name.clone(),
            extension,
            mime_type,
            size: staged.size,
            content_hash,
        })
    }

    /// Best-effort removal of an object whose commit cannot complete.
    async fn abandon(&self, key: &ObjectKey, owner: &OwnerId) {
        match self.timed(self.store.delete(key)).await {
            Ok(()) => debug!(object_key = %key, "abandoned object removed"),
            Err(e) => error!(
                target: ORPHAN_TARGET,
                object_key = %key,
                bucket = self.store.bucket(),
                owner_id = %owner,
                error = %e,
                "abandoned object could not be removed"
            ),
        }
    }

    async fn timed<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.policy.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.policy.timeout)),
        }
    }
}

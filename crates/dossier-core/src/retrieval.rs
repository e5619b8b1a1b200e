use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use dossier_store::config::MAX_PRESIGN_EXPIRY;
use dossier_store::{ObjectStore, StoreError, StoreResult};
use dossier_types::ObjectKey;

use crate::outcome::PresignedUrl;

const FALLBACK_NAME: &str = "download";

/// Human-friendly filename for a download, rebuilt from the stored original
/// name and extension. Directory components and header-breaking characters
/// are dropped; the extension is appended if the name lacks it.
pub fn download_name(original_name: &str, extension: Option<&str>) -> String {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let mut name: String = base
        .chars()
        .map(|c| if c.is_control() || c == '"' { '_' } else { c })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        name = FALLBACK_NAME.to_string();
    }

    let ext: String = extension
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if !ext.is_empty() && !name.to_ascii_lowercase().ends_with(&format!(".{ext}")) {
        name.push('.');
        name.push_str(&ext);
    }
    name
}

/// Issues fresh download URLs for stored objects.
///
/// Stateless apart from the store handle: no coordination is needed between
/// concurrent calls, and no call changes what is stored.
#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn ObjectStore>,
    default_expiry: Duration,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn ObjectStore>, default_expiry: Duration) -> Self {
        Self {
            store,
            default_expiry: default_expiry.min(MAX_PRESIGN_EXPIRY),
        }
    }

    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    /// Sign a URL for `key` that downloads as `file_name`.
    pub async fn presign(
        &self,
        key: &ObjectKey,
        file_name: &str,
        expires_in: Option<Duration>,
    ) -> StoreResult<PresignedUrl> {
        let expires_in = expires_in
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_expiry)
            .min(MAX_PRESIGN_EXPIRY);
        let url = self.store.presign_get(key, expires_in, Some(file_name)).await?;
        debug!(object_key = %key, expires_in_secs = expires_in.as_secs(), "download url issued");
        Ok(PresignedUrl {
            url,
            file_name: file_name.to_string(),
            expires_in_secs: expires_in.as_secs(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::zero()),
        })
    }

    /// Sign a URL for `key`, recovering the download name from the object's
    /// own metadata.
    pub async fn presign_object(
        &self,
        key: &ObjectKey,
        expires_in: Option<Duration>,
    ) -> StoreResult<PresignedUrl> {
        let info = self
            .store
            .head(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let name = download_name(
            info.metadata.get("original-name").map(String::as_str).unwrap_or_default(),
            info.metadata.get("file-extension").map(String::as_str),
        );
        self.presign(key, &name, expires_in).await
    }
}

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use dossier_types::ValidationError;

use crate::error::{StagingError, StagingResult};
use crate::STAGING_PREFIX;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// Configuration for the upload stager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory for staging files. Created on first use.
    pub dir: PathBuf,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Accepted MIME types. Empty accepts everything.
    pub allowed_mime_types: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("dossier-staging"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: [
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "text/plain",
                "text/csv",
                "image/jpeg",
                "image/png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Content type for an upload: the declared type if it is specific, else a
/// guess from the filename extension.
pub fn resolve_mime_type(original_name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(mime) if !mime.is_empty() && mime != OCTET_STREAM => mime.to_ascii_lowercase(),
        _ => mime_guess::from_path(original_name)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string(),
    }
}

/// Ephemeral reference to bytes staged on local disk, pending commit.
///
/// Never persisted. The file must be removed after commit or abandonment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingHandle {
    pub id: String,
    pub temp_path: PathBuf,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub staged_at: DateTime<Utc>,
}

impl StagingHandle {
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Lowercased extension of the original filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Read the staged bytes back.
    pub async fn read(&self) -> StagingResult<Bytes> {
        Ok(Bytes::from(tokio::fs::read(&self.temp_path).await?))
    }

    /// Remove the staging file. A file that is already gone is not an error.
    pub async fn discard(&self) -> StagingResult<()> {
        match tokio::fs::remove_file(&self.temp_path).await {
            Ok(()) => {
                debug!(staging_id = %self.id, "staging file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Removes its file on drop unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "partial staging file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial staging file"),
        }
    }
}

/// First phase of the upload pipeline: validate, then write to local disk.
#[derive(Clone, Debug)]
pub struct Stager {
    config: StagingConfig,
}

impl Stager {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.config.max_upload_bytes
    }

    /// Stage a fully buffered upload.
    pub async fn stage(
        &self,
        original_name: &str,
        declared_mime: Option<&str>,
        data: Bytes,
    ) -> StagingResult<StagingHandle> {
        let mime_type = self.check_declared(original_name, declared_mime)?;
        if data.is_empty() {
            return Err(ValidationError::NoFile.into());
        }
        self.check_size(data.len() as u64)?;

        let (id, staged_at, path) = self.allocate().await?;
        let guard = PartialFile::new(path.clone());
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        guard.disarm();

        debug!(staging_id = %id, size = data.len(), "upload staged");
        Ok(StagingHandle {
            id,
            temp_path: path,
            original_name: original_name.to_string(),
            mime_type,
            size: data.len() as u64,
            staged_at,
        })
    }

    /// Stage an upload arriving as a chunk stream.
    ///
    /// No file is created until the first non-empty chunk arrives. The ceiling
    /// is enforced while writing; crossing it, a stream error, or dropping the
    /// returned future removes the partial file.
    pub async fn stage_stream<S, E>(
        &self,
        original_name: &str,
        declared_mime: Option<&str>,
        mut chunks: S,
    ) -> StagingResult<StagingHandle>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let mime_type = self.check_declared(original_name, declared_mime)?;

        let first = loop {
            match chunks.next().await {
                None => return Err(ValidationError::NoFile.into()),
                Some(Err(e)) => return Err(StagingError::Stream(e.to_string())),
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
            }
        };
        let mut size = first.len() as u64;
        self.check_size(size)?;

        let (id, staged_at, path) = self.allocate().await?;
        let guard = PartialFile::new(path.clone());
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&first).await?;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| StagingError::Stream(e.to_string()))?;
            size += chunk.len() as u64;
            self.check_size(size)?;
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        drop(file);
        guard.disarm();

        debug!(staging_id = %id, size, "streamed upload staged");
        Ok(StagingHandle {
            id,
            temp_path: path,
            original_name: original_name.to_string(),
            mime_type,
            size,
            staged_at,
        })
    }

    fn check_declared(
        &self,
        original_name: &str,
        declared_mime: Option<&str>,
    ) -> Result<String, ValidationError> {
        let name = original_name.trim();
        if name.is_empty() {
            return Err(ValidationError::NoFile);
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(ValidationError::invalid("fileName", "must not contain path separators"));
        }

        let mime_type = resolve_mime_type(name, declared_mime);
        let allowed = &self.config.allowed_mime_types;
        if !allowed.is_empty() && !allowed.iter().any(|m| m.eq_ignore_ascii_case(&mime_type)) {
            return Err(ValidationError::DisallowedType(mime_type));
        }
        Ok(mime_type)
    }

    fn check_size(&self, size: u64) -> Result<(), ValidationError> {
        let limit = self.config.max_upload_bytes;
        if size > limit {
            return Err(ValidationError::TooLarge { size, limit });
        }
        Ok(())
    }

    async fn allocate(&self) -> StagingResult<(String, DateTime<Utc>, PathBuf)> {
        tokio::fs::create_dir_all(&self.config.dir).await?;
        let staged_at = Utc::now();
        let id = format!(
            "{STAGING_PREFIX}{}-{}",
            staged_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let path = self.config.dir.join(&id);
        Ok((id, staged_at, path))
    }
}

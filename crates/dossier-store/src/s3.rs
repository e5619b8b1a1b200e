use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use tracing::{debug, info};

use dossier_types::ObjectKey;

use crate::config::{ObjectStoreConfig, MAX_PRESIGN_EXPIRY};
use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectInfo, ObjectMetadata, ObjectStore};

const AUTH_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
    "AuthorizationHeaderMalformed",
];

const BUCKET_CODES: &[&str] = &["NoSuchBucket", "AccessDenied", "AllAccessDisabled"];

/// Calls whose 404 means the bucket itself is missing.
const BUCKET_OPS: &[&str] = &["head_bucket", "create_bucket", "list_objects_v2"];

/// Map an SDK failure onto the commit taxonomy.
fn classify<E>(op: &'static str, err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{op}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            return StoreError::Connection(message);
        }
        _ => {}
    }
    match err.as_service_error().and_then(|e| e.code()) {
        Some(code) if AUTH_CODES.contains(&code) => StoreError::Auth(message),
        Some(code) if BUCKET_CODES.contains(&code) => StoreError::Bucket(message),
        Some(_) => StoreError::Unknown(message),
        // HEAD responses carry no body, so only the status is left.
        None => match err.raw_response().map(|r| r.status().as_u16()) {
            Some(401 | 403) => StoreError::Auth(message),
            Some(404) if BUCKET_OPS.contains(&op) => StoreError::Bucket(message),
            _ => StoreError::Unknown(message),
        },
    }
}

/// `ObjectStore` backed by an S3-compatible endpoint (MinIO in production).
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    /// Build a client from configuration. Performs no network I/O.
    pub fn new(config: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "dossier-config",
        );
        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .force_path_style(true)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout())
                    .build(),
            )
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }

    /// Wrap an existing SDK client.
    pub fn from_client(client: aws_sdk_s3::Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()) == Some(true) => Ok(false),
            Err(e) => Err(classify("head_bucket", e)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn ensure_bucket(&self) -> StoreResult<()> {
        if self.bucket_exists().await? {
            debug!("bucket exists");
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => {
                info!("bucket created");
                Ok(())
            }
            // Another instance created it between our check and create.
            Err(e) if e.as_service_error().map(|s| s.is_bucket_already_owned_by_you()) == Some(true) => Ok(()),
            Err(e) => Err(classify("create_bucket", e)),
        }
    }

    #[tracing::instrument(skip(self, metadata), fields(bucket = %self.bucket))]
    async fn put_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StoreResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .content_type(content_type)
            .set_metadata(Some(metadata.to_map()))
            .body(body)
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().map(|s| s.is_no_such_key()) == Some(true) => {
                return Err(StoreError::NotFound(key.clone()));
            }
            Err(e) => return Err(classify("get_object", e)),
        };
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(format!("get_object body: {e}")))?;
        Ok(body.into_bytes())
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectInfo>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(resp) => Ok(Some(ObjectInfo {
                key: key.clone(),
                size: resp.content_length().unwrap_or_default().max(0) as u64,
                content_type: resp.content_type().map(str::to_string),
                metadata: resp.metadata().cloned().unwrap_or_default(),
            })),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()) == Some(true) => Ok(None),
            Err(e) => Err(classify("head_object", e)),
        }
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| classify("delete_object", e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presign_get(
        &self,
        key: &ObjectKey,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> StoreResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in.min(MAX_PRESIGN_EXPIRY))
            .map_err(|e| StoreError::Unknown(format!("presigning config: {e}")))?;
        let mut request = self.client.get_object().bucket(&self.bucket).key(key.as_str());
        if let Some(name) = download_name {
            request = request.response_content_disposition(format!(
                "attachment; filename=\"{}\"",
                name.replace(['"', '\\'], "_")
            ));
        }
        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|e| classify("presign_get_object", e))?;
        Ok(presigned.uri().to_string())
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<ObjectKey>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify("list_objects_v2", e))?;
            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key())
                    .map(ObjectKey::from_raw),
            );
            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_types::Category;

    fn store() -> S3ObjectStore {
        S3ObjectStore::new(&ObjectStoreConfig {
            endpoint: "minio.local".into(),
            port: 9000,
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "secret".into(),
            bucket: "accreditation".into(),
            ..ObjectStoreConfig::default()
        })
    }

    #[test]
    fn construction_needs_no_network() {
        let store = store();
        assert_eq!(store.bucket(), "accreditation");
    }

    #[tokio::test]
    async fn presigned_url_is_signed_offline() {
        let store = store();
        let key = ObjectKey::generate(Category::Research);
        let url = store
            .presign_get(&key, Duration::from_secs(3600), Some("proposal.pdf"))
            .await
            .unwrap();

        assert!(url.starts_with("http://minio.local:9000/accreditation/research/"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("response-content-disposition="));
    }

    // ====================================================================
    // Status-only failures
    // ====================================================================

    /// Endpoint answering every request with `status` and an empty body.
    async fn empty_body_endpoint(status: &'static str) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        port
    }

    fn store_at(port: u16) -> S3ObjectStore {
        S3ObjectStore::new(&ObjectStoreConfig {
            endpoint: "127.0.0.1".into(),
            port,
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "wrong".into(),
            bucket: "accreditation".into(),
            request_timeout_secs: 5,
            ..ObjectStoreConfig::default()
        })
    }

    #[tokio::test]
    async fn forbidden_head_bucket_is_an_auth_failure() {
        let store = store_at(empty_body_endpoint("403 Forbidden").await);
        let err = store.ensure_bucket().await.unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)), "got {err:?}");
        assert!(!err.is_transient());
        assert_eq!(err.error_type(), dossier_types::ErrorType::AuthError);
    }

    #[tokio::test]
    async fn unauthorized_head_object_is_an_auth_failure() {
        let store = store_at(empty_body_endpoint("401 Unauthorized").await);
        let key = ObjectKey::generate(Category::Research);
        let err = store.head(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)), "got {err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn presign_expiry_is_capped_at_seven_days() {
        let store = store();
        let key = ObjectKey::generate(Category::Other);
        let url = store
            .presign_get(&key, Duration::from_secs(30 * 24 * 3600), None)
            .await
            .unwrap();
        assert!(url.contains("X-Amz-Expires=604800"));
    }
}

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the backing S3-compatible store.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Host name of the store, without scheme or port.
    pub endpoint: String,
    pub port: u16,
    pub use_tls: bool,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Deadline for a single store call.
    pub request_timeout_secs: u64,
    /// Validity window of issued download URLs.
    pub presign_expiry_secs: u64,
    /// Extra attempts for transient commit failures.
    pub commit_retries: u32,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost".into(),
            port: 9000,
            use_tls: false,
            access_key: String::new(),
            secret_key: String::new(),
            bucket: "accreditation-documents".into(),
            region: "us-east-1".into(),
            request_timeout_secs: 30,
            presign_expiry_secs: 24 * 60 * 60,
            commit_retries: 2,
        }
    }
}

/// S3 rejects presigned URLs valid for longer than seven days.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

impl ObjectStoreConfig {
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.endpoint, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs).min(MAX_PRESIGN_EXPIRY)
    }
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("presign_expiry_secs", &self.presign_expiry_secs)
            .field("commit_retries", &self.commit_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ObjectStoreConfig::default();
        assert_eq!(c.endpoint_url(), "http://localhost:9000");
        assert_eq!(c.presign_expiry(), Duration::from_secs(86_400));
        assert_eq!(c.commit_retries, 2);
    }

    #[test]
    fn tls_switches_scheme() {
        let c = ObjectStoreConfig {
            endpoint: "minio.kampus.ac.id".into(),
            port: 443,
            use_tls: true,
            ..Default::default()
        };
        assert_eq!(c.endpoint_url(), "https://minio.kampus.ac.id:443");
    }

    #[test]
    fn presign_expiry_is_capped() {
        let c = ObjectStoreConfig {
            presign_expiry_secs: 30 * 24 * 60 * 60,
            ..Default::default()
        };
        assert_eq!(c.presign_expiry(), MAX_PRESIGN_EXPIRY);
    }

    #[test]
    fn debug_redacts_secret() {
        let c = ObjectStoreConfig {
            secret_key: "super-secret".into(),
            ..Default::default()
        };
        let debug = format!("{c:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}

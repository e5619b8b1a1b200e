use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dossier_staging::{StagingConfig, SweepConfig};
use dossier_store::ObjectStoreConfig;

use crate::error::{ServerError, ServerResult};

/// Room for multipart boundaries and text fields on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

const REDACTED: &str = "<redacted>";

/// Catalog database settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite connection URL.
    pub url: String,
    pub max_connections: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://dossier-catalog.db".into(),
            max_connections: 4,
        }
    }
}

/// Complete server configuration.
///
/// Loaded from TOML, then overridden field by field from `DOSSIER_*`
/// environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub object_store: ObjectStoreConfig,
    pub staging: StagingConfig,
    pub sweep: SweepConfig,
    pub catalog: CatalogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            object_store: ObjectStoreConfig::default(),
            staging: StagingConfig::default(),
            sweep: SweepConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> ServerResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ServerError::Config(format!("{var}={value:?}: {e}")))
}

impl ServerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read `path` if given, then apply the process environment.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ServerError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Override fields from `DOSSIER_*` variables resolved by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DOSSIER_BIND_ADDR") {
            self.bind_addr = parse("DOSSIER_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("DOSSIER_S3_ENDPOINT") {
            self.object_store.endpoint = v;
        }
        if let Some(v) = get("DOSSIER_S3_PORT") {
            self.object_store.port = parse("DOSSIER_S3_PORT", &v)?;
        }
        if let Some(v) = get("DOSSIER_S3_USE_TLS") {
            self.object_store.use_tls = parse("DOSSIER_S3_USE_TLS", &v)?;
        }
        if let Some(v) = get("DOSSIER_S3_ACCESS_KEY") {
            self.object_store.access_key = v;
        }
        if let Some(v) = get("DOSSIER_S3_SECRET_KEY") {
            self.object_store.secret_key = v;
        }
        if let Some(v) = get("DOSSIER_S3_BUCKET") {
            self.object_store.bucket = v;
        }
        if let Some(v) = get("DOSSIER_S3_REGION") {
            self.object_store.region = v;
        }
        if let Some(v) = get("DOSSIER_STAGING_DIR") {
            self.staging.dir = PathBuf::from(v);
        }
        if let Some(v) = get("DOSSIER_MAX_UPLOAD_BYTES") {
            self.staging.max_upload_bytes = parse("DOSSIER_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("DOSSIER_CATALOG_URL") {
            self.catalog.url = v;
        }
        Ok(())
    }

    /// HTTP body ceiling for upload routes.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.staging.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD))
            .unwrap_or(usize::MAX)
    }

    /// Copy safe to print: credentials replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.object_store.secret_key.is_empty() {
            copy.object_store.secret_key = REDACTED.into();
        }
        copy
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.staging.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.sweep.interval_secs, 300);
        assert_eq!(c.sweep.max_age_secs, 3600);
        assert_eq!(c.object_store.presign_expiry_secs, 24 * 3600);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"

            [object_store]
            endpoint = "minio.internal"
            bucket = "accreditation"

            [staging]
            max_upload_bytes = 2048
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.object_store.endpoint, "minio.internal");
        assert_eq!(c.object_store.port, 9000);
        assert_eq!(c.object_store.bucket, "accreditation");
        assert_eq!(c.staging.max_upload_bytes, 2048);
        assert!(!c.staging.allowed_mime_types.is_empty());
        assert_eq!(c.catalog, CatalogConfig::default());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ServerConfig::from_toml("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let mut c = ServerConfig::default();
        c.apply_env(env(&[
            ("DOSSIER_S3_ENDPOINT", "s3.example.org"),
            ("DOSSIER_S3_PORT", "443"),
            ("DOSSIER_S3_USE_TLS", "true"),
            ("DOSSIER_S3_SECRET_KEY", "hunter2"),
            ("DOSSIER_STAGING_DIR", "/var/tmp/stage"),
            ("DOSSIER_MAX_UPLOAD_BYTES", "1024"),
            ("DOSSIER_CATALOG_URL", "sqlite::memory:"),
            ("DOSSIER_S3_BUCKET", ""),
        ]))
        .unwrap();
        assert_eq!(c.object_store.endpoint_url(), "https://s3.example.org:443");
        assert_eq!(c.object_store.secret_key, "hunter2");
        assert_eq!(c.staging.dir, PathBuf::from("/var/tmp/stage"));
        assert_eq!(c.staging.max_upload_bytes, 1024);
        assert_eq!(c.catalog.url, "sqlite::memory:");
        // Blank values are ignored.
        assert_eq!(c.object_store.bucket, "accreditation-documents");
    }

    #[test]
    fn malformed_environment_value_names_the_variable() {
        let mut c = ServerConfig::default();
        let err = c.apply_env(env(&[("DOSSIER_S3_PORT", "ninety")])).unwrap_err();
        assert!(err.to_string().contains("DOSSIER_S3_PORT"));
    }

    #[test]
    fn redacted_copy_hides_the_secret() {
        let mut c = ServerConfig::default();
        c.object_store.secret_key = "hunter2".into();
        let printed = c.redacted().to_toml().unwrap();
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains(REDACTED));
        assert!(!format!("{:?}", c).contains("hunter2"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dossier.toml");
        std::fs::write(&path, "[sweep]\ninterval_secs = 60\n").unwrap();
        let c = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(c.sweep.interval_secs, 60);
        assert!(ServerConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}

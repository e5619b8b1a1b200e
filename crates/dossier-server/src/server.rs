use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dossier_catalog::SqliteCatalog;
use dossier_core::{CommitPolicy, DocumentService};
use dossier_staging::{CleanupSweep, Stager};
use dossier_store::S3ObjectStore;

use crate::auth::{AuthProvider, HeaderAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};

/// Document store HTTP server.
pub struct DossierServer {
    config: ServerConfig,
    state: AppState,
}

impl DossierServer {
    /// Wire the production backends: S3 object store and SQLite catalog.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let service = Arc::new(build_service(&config).await?);
        Ok(Self::with_service(config, service, Arc::new(HeaderAuth)))
    }

    /// Wire an already built service, e.g. one backed by test doubles.
    pub fn with_service(
        config: ServerConfig,
        service: Arc<DocumentService>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            state: AppState::new(service, auth),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<DocumentService> {
        &self.state.service
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.body_limit())
    }

    /// Serve until `shutdown` fires. The staging sweep runs alongside and
    /// stops with the server.
    pub async fn serve(self, shutdown: CancellationToken) -> ServerResult<()> {
        self.state.service.warm_up().await;

        let sweep = CleanupSweep::new(&self.config.staging.dir, self.config.sweep.max_age())
            .spawn(self.config.sweep.interval(), shutdown.child_token());

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            bucket = %self.config.object_store.bucket,
            "dossier server listening"
        );
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        shutdown.cancel();
        if let Err(e) = sweep.await {
            tracing::warn!(error = %e, "staging sweep task ended abnormally");
        }
        info!("dossier server stopped");
        result
    }
}

/// Production service: S3 store, migrated SQLite catalog, disk staging.
pub async fn build_service(config: &ServerConfig) -> ServerResult<DocumentService> {
    let catalog = SqliteCatalog::connect(&config.catalog.url, config.catalog.max_connections)
        .await
        .map_err(|e| ServerError::Config(format!("catalog {}: {e}", config.catalog.url)))?;

    let store = S3ObjectStore::new(&config.object_store);
    Ok(DocumentService::new(
        Stager::new(config.staging.clone()),
        Arc::new(store),
        Arc::new(catalog),
        CommitPolicy::from_config(&config.object_store),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_catalog::InMemoryCatalog;
    use dossier_store::InMemoryObjectStore;

    fn server() -> DossierServer {
        let config = ServerConfig::default();
        let service = DocumentService::new(
            Stager::new(config.staging.clone()),
            Arc::new(InMemoryObjectStore::with_bucket("accreditation")),
            Arc::new(InMemoryCatalog::new()),
            CommitPolicy::default(),
        );
        DossierServer::with_service(config, Arc::new(service), Arc::new(HeaderAuth))
    }

    #[test]
    fn server_construction() {
        let server = server();
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(server.service().store().bucket(), "accreditation");
    }

    #[tokio::test]
    async fn catalog_url_is_validated_at_startup() {
        let mut config = ServerConfig::default();
        config.catalog.url = "sqlite:///nonexistent-dir/deeper/catalog.db".into();
        let err = build_service(&config).await.err().unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let mut server = server();
        server.config.bind_addr = "127.0.0.1:0".parse().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(shutdown.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}

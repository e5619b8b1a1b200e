use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use dossier_core::DocumentService;

use crate::auth::AuthProvider;
use crate::handler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DocumentService>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(service: Arc<DocumentService>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { service, auth }
    }
}

/// Build the axum router with all document endpoints.
///
/// `body_limit` caps request bodies; upload routes need the staging ceiling
/// plus multipart overhead.
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route(
            "/v1/documents",
            post(handler::upload_handler).get(handler::list_handler),
        )
        .route(
            "/v1/documents/:id",
            get(handler::get_handler).delete(handler::delete_handler),
        )
        .route("/v1/documents/:id/restore", post(handler::restore_handler))
        .route("/v1/documents/:id/purge", delete(handler::purge_handler))
        .route(
            "/v1/documents/:id/versions",
            post(handler::upload_version_handler).get(handler::list_versions_handler),
        )
        .route(
            "/v1/documents/:id/versions/:number",
            get(handler::get_version_handler),
        )
        .route("/v1/documents/:id/url", get(handler::presign_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use dossier_catalog::CatalogError;
use dossier_core::{FailureResponse, ServiceError};
use dossier_store::StoreError;
use dossier_types::{ErrorType, ValidationError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status and wire-level kind for this failure.
    pub fn classify(&self) -> (StatusCode, ErrorType) {
        match self {
            Self::AuthFailed(_) => (StatusCode::UNAUTHORIZED, ErrorType::AuthError),
            Self::Validation(_) | Self::Multipart(_) => {
                (StatusCode::BAD_REQUEST, ErrorType::ProcessingError)
            }
            Self::Service(e) => (service_status(e), e.error_type()),
            Self::Catalog(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorType::UnknownError)
            }
        }
    }
}

fn service_status(err: &ServiceError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Catalog(CatalogError::Deleted(_)) => StatusCode::CONFLICT,
        ServiceError::Catalog(CatalogError::Contention { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Commit(StoreError::Auth(_) | StoreError::Bucket(_)) => StatusCode::BAD_GATEWAY,
        ServiceError::Commit(StoreError::Connection(_) | StoreError::Timeout(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error_type = %error_type, error = %self, "request failed");
        }
        let body = FailureResponse::new(self.to_string(), error_type);
        (status, Json(body)).into_response()
    }
}

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use dossier_types::OwnerId;

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// Header set by the portal gateway after it authenticated the user.
pub const USER_HEADER: &str = "x-user-id";

/// Authenticated caller. Every document operation is scoped to `owner`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub owner: OwnerId,
}

impl Identity {
    pub fn new(owner: OwnerId) -> Self {
        Self { owner }
    }
}

/// What the request presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    User(String),
    Anonymous,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self::User(v.to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Trusts the gateway header. Anonymous requests are refused.
pub struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::User(id) => OwnerId::new(id.as_str())
                .map(Identity::new)
                .map_err(|e| ServerError::AuthFailed(e.to_string())),
            Credentials::Anonymous => Err(ServerError::AuthFailed(format!(
                "missing {USER_HEADER} header"
            ))),
        }
    }
}

/// Extractor resolving the caller through the configured [`AuthProvider`].
#[derive(Clone, Debug)]
pub struct Caller(pub Identity);

impl Caller {
    pub fn owner(&self) -> &OwnerId {
        &self.0.owner
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_headers(&parts.headers);
        state.auth.authenticate(&credentials).await.map(Caller)
    }
}

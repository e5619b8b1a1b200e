//! HTTP server for the dossier document store.
//!
//! Exposes upload, catalog, version history and download-URL endpoints over
//! axum. Every document route is scoped to the caller identity resolved by an
//! [`AuthProvider`]; every failure is answered with the structured failure
//! body and its wire-level error type.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod multipart;
pub mod router;
pub mod server;

pub use auth::{AuthProvider, Caller, Credentials, HeaderAuth, Identity, USER_HEADER};
pub use config::{CatalogConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use router::{build_router, AppState};
pub use server::{build_service, DossierServer};

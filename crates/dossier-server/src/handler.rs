use std::time::Duration;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use dossier_catalog::DocumentQuery;
use dossier_core::{PresignedUrl, PurgeReport, UploadResponse};
use dossier_types::{Category, Document, DocumentId, OwnerId, RelatedItemType, ValidationError, Version};

use crate::auth::Caller;
use crate::error::{ServerError, ServerResult};
use crate::multipart::UploadForm;
use crate::router::AppState;

// =============================================================================
// Service endpoints
// =============================================================================

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "dossier-server",
        "version": env!("CARGO_PKG_VERSION"),
        "bucket": state.service.store().bucket(),
        "bucketReady": state.service.bucket_ready(),
    }))
}

// =============================================================================
// Parameter parsing
// =============================================================================

fn document_id(raw: &str) -> Result<DocumentId, ValidationError> {
    Ok(raw.parse::<DocumentId>()?)
}

fn version_number(raw: &str) -> Result<u32, ValidationError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ValidationError::invalid("version", format!("{raw:?} is not a positive integer")))
}

fn timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ValidationError::invalid(field, e.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn multipart(body: Result<Multipart, MultipartRejection>) -> ServerResult<Multipart> {
    body.map_err(|e| ServerError::Multipart(e.body_text()))
}

/// Query string of the listing endpoint. Every value arrives as text so a
/// malformed one is reported in the failure shape, not as a bare rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub related_item_type: Option<String>,
    pub related_item_id: Option<String>,
    pub q: Option<String>,
    pub tags: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub include_deleted: Option<String>,
}

impl ListParams {
    pub fn into_query(self, owner: OwnerId) -> Result<DocumentQuery, ValidationError> {
        let mut query = DocumentQuery::new().owned_by(owner);
        if let Some(c) = non_blank(self.category) {
            query = query.in_category(c.parse::<Category>()?);
        }
        if let Some(t) = non_blank(self.related_item_type) {
            query.related_item_type = Some(t.parse::<RelatedItemType>()?);
        }
        query.related_item_id = non_blank(self.related_item_id);
        if let Some(q) = non_blank(self.q) {
            query = query.matching(q);
        }
        if let Some(tags) = non_blank(self.tags) {
            query = query.with_tags(
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }
        let from = non_blank(self.from).map(|f| timestamp("from", &f)).transpose()?;
        let to = non_blank(self.to).map(|t| timestamp("to", &t)).transpose()?;
        query = query.created_between(from, to);
        match non_blank(self.include_deleted).as_deref() {
            None | Some("false") | Some("0") => {}
            Some("true") | Some("1") => query = query.including_deleted(),
            Some(other) => {
                return Err(ValidationError::invalid(
                    "include_deleted",
                    format!("{other:?} is not a boolean"),
                ))
            }
        }
        Ok(query)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PresignParams {
    pub version: Option<String>,
    pub expires_in: Option<String>,
}

impl PresignParams {
    fn parse(self) -> Result<(Option<u32>, Option<Duration>), ValidationError> {
        let version = non_blank(self.version).map(|v| version_number(&v)).transpose()?;
        let expires_in = non_blank(self.expires_in)
            .map(|v| {
                v.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ValidationError::invalid("expires_in", e.to_string()))
            })
            .transpose()?;
        Ok((version, expires_in))
    }
}

// =============================================================================
// Documents
// =============================================================================

pub async fn upload_handler(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Multipart, MultipartRejection>,
) -> ServerResult<(StatusCode, Json<UploadResponse>)> {
    let (request, staged) =
        UploadForm::read_upload(state.service.stager(), multipart(body)?, caller.owner().clone())
            .await?;
    let response = state.service.upload_staged(request, staged).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> ServerResult<Json<Vec<Document>>> {
    let query = params.into_query(caller.owner().clone())?;
    Ok(Json(state.service.list(&query).await?))
}

pub async fn get_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ServerResult<Json<Document>> {
    let id = document_id(&id)?;
    Ok(Json(state.service.get(id, caller.owner()).await?))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ServerResult<Json<Document>> {
    let id = document_id(&id)?;
    Ok(Json(state.service.soft_delete(id, caller.owner()).await?))
}

pub async fn restore_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ServerResult<Json<Document>> {
    let id = document_id(&id)?;
    Ok(Json(state.service.restore(id, caller.owner()).await?))
}

pub async fn purge_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ServerResult<Json<PurgeReport>> {
    let id = document_id(&id)?;
    Ok(Json(state.service.hard_delete(id, caller.owner()).await?))
}

// =============================================================================
// Versions
// =============================================================================

pub async fn upload_version_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Multipart, MultipartRejection>,
) -> ServerResult<(StatusCode, Json<UploadResponse>)> {
    let id = document_id(&id)?;
    let (request, staged) =
        UploadForm::read_revision(state.service.stager(), multipart(body)?).await?;
    let response = state
        .service
        .revise_staged(id, caller.owner(), request, staged)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_versions_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<Version>>> {
    let id = document_id(&id)?;
    Ok(Json(state.service.versions(id, caller.owner()).await?))
}

pub async fn get_version_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, number)): Path<(String, String)>,
) -> ServerResult<Json<Version>> {
    let id = document_id(&id)?;
    let number = version_number(&number)?;
    Ok(Json(state.service.version(id, caller.owner(), number).await?))
}

pub async fn presign_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<PresignParams>,
) -> ServerResult<Json<PresignedUrl>> {
    let id = document_id(&id)?;
    let (version, expires_in) = params.parse()?;
    Ok(Json(
        state
            .service
            .presign(id, caller.owner(), version, expires_in)
            .await?,
    ))
}

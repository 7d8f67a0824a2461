//! HTTP handlers for the upload API. Each handler resolves the caller,
//! hands the request to the controllers and renders the outcome as JSON.

use crate::{
    controllers::{OperationOutput, OperationRequest},
    errors::{AppError, UploadError},
    models::actor::{Actor, RequestContext},
    services::credentials::UploadCredential,
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, request::Parts},
};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Build the caller context from identity headers set by the auth layer.
/// Only an `admin` role with an actor id is privileged.
pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let actor = header(ACTOR_ID_HEADER).map(|id| Actor { id: id.to_string() });
    let is_admin = header(ACTOR_ROLE_HEADER).is_some_and(|role| role.eq_ignore_ascii_case("admin"));

    match actor {
        Some(actor) if is_admin => RequestContext::privileged(actor),
        actor => RequestContext::public(actor),
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(context_from_headers(&parts.headers))
    }
}

/// Parse an optional JSON body; an empty body reads as `null`.
fn json_body(body: &Bytes) -> Result<Value, AppError> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| UploadError::InvalidRequest(format!("invalid JSON body: {}", e)).into())
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlQuery {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

/// `GET /files/uploadURL?name=&type=`
pub async fn upload_url(
    State(state): State<AppState>,
    Query(query): Query<UploadUrlQuery>,
) -> Result<Json<UploadCredential>, AppError> {
    let credential = state
        .credentials
        .issue_upload_credential(
            query.name.as_deref().unwrap_or_default(),
            query.content_type.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(credential))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub id: Option<String>,
}

/// `POST /upload[?id=]`
pub async fn upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<OperationOutput>, AppError> {
    let body = json_body(&body)?;
    let out = state
        .controllers
        .upload(&ctx, query.id.as_deref().filter(|id| !id.is_empty()), &body)
        .await?;
    Ok(Json(out))
}

/// `GET /upload/files`
pub async fn find_files(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        query,
        ..Default::default()
    };
    Ok(Json(state.controllers.dispatch(&ctx, "find", req).await?))
}

/// `GET /upload/files/count`
pub async fn count_files(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        query,
        ..Default::default()
    };
    Ok(Json(state.controllers.dispatch(&ctx, "count", req).await?))
}

/// `GET /upload/files/{id}`
pub async fn find_one_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        id: Some(id),
        ..Default::default()
    };
    Ok(Json(state.controllers.dispatch(&ctx, "findOne", req).await?))
}

/// `DELETE /upload/files/{id}`
pub async fn destroy_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        id: Some(id),
        ..Default::default()
    };
    Ok(Json(state.controllers.dispatch(&ctx, "destroy", req).await?))
}

/// `GET /upload/search/{id}`
pub async fn search(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(term): Path<String>,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        id: Some(term),
        ..Default::default()
    };
    Ok(Json(state.controllers.dispatch(&ctx, "search", req).await?))
}

/// `GET /upload/settings`
pub async fn get_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<OperationOutput>, AppError> {
    let out = state
        .controllers
        .dispatch(&ctx, "getSettings", OperationRequest::default())
        .await?;
    Ok(Json(out))
}

/// `PUT /upload/settings`
pub async fn update_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<OperationOutput>, AppError> {
    let req = OperationRequest {
        body: json_body(&body)?,
        ..Default::default()
    };
    let out = state
        .controllers
        .dispatch(&ctx, "updateSettings", req)
        .await?;
    Ok(Json(out))
}

/// `POST /upload/{operation}` with the record id, if any, in `?id=` and
/// listing filters in the remaining query pairs.
pub async fn operation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(operation): Path<String>,
    Query(mut query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<OperationOutput>, AppError> {
    let id = query
        .iter()
        .position(|(k, _)| k == "id")
        .map(|idx| query.remove(idx).1);
    let req = OperationRequest {
        id,
        query,
        body: json_body(&body)?,
    };
    Ok(Json(state.controllers.dispatch(&ctx, &operation, req).await?))
}

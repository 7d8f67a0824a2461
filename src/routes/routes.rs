//! Defines routes for the upload API.
//!
//! ## Structure
//! - **Credential issuance**
//!   - `GET    /files/uploadURL?name=&type=` -> signed put URL + Bucket/Key
//!
//! - **Upload endpoints**
//!   - `POST   /upload[?id=]` -> persist intents, or edit a record's info
//!   - `GET    /upload/files` -> list records (Strapi-style filters)
//!   - `GET    /upload/files/count` -> count records
//!   - `GET    /upload/files/{id}` -> fetch one record
//!   - `DELETE /upload/files/{id}` -> remove a record
//!   - `GET    /upload/search/{id}` -> hash/name substring search
//!   - `GET|PUT /upload/settings` -> plugin settings (privileged only)
//!   - `POST   /upload/{operation}` -> call a controller operation by name

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{
            count_files, destroy_file, find_files, find_one_file, get_settings, operation, search,
            update_settings, upload, upload_url,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router. Static segments win over `{operation}` in axum's
/// matcher, so `/upload/settings` and friends are never dispatched by name.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files/uploadURL", get(upload_url))
        .route("/upload", post(upload))
        .route("/upload/files", get(find_files))
        .route("/upload/files/count", get(count_files))
        .route("/upload/files/{id}", get(find_one_file).delete(destroy_file))
        .route("/upload/search/{id}", get(search))
        .route("/upload/settings", get(get_settings).put(update_settings))
        .route("/upload/{operation}", post(operation))
        .layer(TraceLayer::new_for_http())
}

use crate::{models::query::QueryParseError, services::record_store::StoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A single field-level validation message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failures of the upload domain.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("File upload is disabled")]
    Disabled,
    #[error("request body failed validation ({} errors)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
    #[error("credential issuance failed: {0}")]
    Credential(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("upload of file {index} failed ({} other files persisted): {source}", succeeded.len())]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<UploadError>,
        succeeded: Vec<Uuid>,
    },
}

impl UploadError {
    /// Stable machine-readable kind sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NotFound(_) => "NotFound",
            Self::Disabled => "Disabled",
            Self::Validation(_) => "ValidationError",
            Self::Unimplemented(_) => "Unimplemented",
            Self::Credential(_) => "CredentialError",
            Self::Store(_) => "StoreError",
            Self::BatchFailed { source, .. } => source.kind(),
        }
    }
}

impl From<QueryParseError> for UploadError {
    fn from(err: QueryParseError) -> Self {
        UploadError::InvalidRequest(err.to_string())
    }
}

/// Error returned from HTTP handlers, rendered as a JSON payload.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            errors: Vec::new(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind,
            "message": self.message,
            "status": self.status.as_u16(),
            "errors": self.errors,
        }));

        (self.status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::InvalidRequest(_)
            | UploadError::Disabled
            | UploadError::Validation(_) => StatusCode::BAD_REQUEST,
            UploadError::NotFound(_) => StatusCode::NOT_FOUND,
            UploadError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            UploadError::BatchFailed { source, .. } => match source.as_ref() {
                UploadError::InvalidRequest(_) | UploadError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            UploadError::Credential(_) | UploadError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        let kind = err.kind();
        let message = err.to_string();
        let errors = match err {
            UploadError::Validation(errors) => errors,
            _ => Vec::new(),
        };
        Self {
            status,
            kind,
            message,
            errors,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

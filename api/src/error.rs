use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::db::SaveError;
use crate::types::ValidationErrors;

/// Failures a request can end in, each mapped to one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<SaveError> for ApiError {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::Invalid(errors) => ApiError::Validation(errors),
            SaveError::NotFound => ApiError::NotFound("Resource parameter not found".to_string()),
            SaveError::Db(e) => ApiError::Internal(e.into()),
            SaveError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let body = match &self {
            ApiError::Validation(errors) => json!({
                "error": {
                    "kind": kind,
                    "message": self.to_string(),
                    "errors": errors.errors(),
                    "full_messages": errors.full_messages(),
                }
            }),
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                json!({
                    "error": {
                        "kind": kind,
                        "message": "Internal server error",
                    }
                })
            }
            _ => json!({
                "error": {
                    "kind": kind,
                    "message": self.to_string(),
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

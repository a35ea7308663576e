use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use prepwise_core::error::PrepwiseError;

/// Errors returned by HTTP handlers, rendered as
/// `{"success": false, "error": ..., "errorType"?: ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected before any side effect.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] PrepwiseError),
}

impl ApiError {
    pub fn missing_fields() -> Self {
        Self::BadRequest("Missing required fields".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => json!({
                "success": false,
                "error": message,
            }),
            Self::Internal(err) => json!({
                "success": false,
                "error": err.detail(),
                "errorType": err.kind(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dealmap_core::query::ValidationError;
use dealmap_storage::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

const INTERNAL_MESSAGE: &str = "internal server error";

/// Failures surfaced through the `{ok:false, code, error}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("data store is unavailable")]
    StoreUnavailable,
    /// Details are logged, never returned to the client.
    #[error("internal error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    code: &'static str,
    error: String,
}

impl ApiError {
    /// Classify a store fault, logging internal ones against `route`.
    pub fn from_store(route: &str, err: StoreError) -> Self {
        if err.is_unavailable() {
            tracing::warn!(route, error = %err, "store unavailable");
            return ApiError::StoreUnavailable;
        }
        error!(route, error = %err, "store query failed");
        ApiError::Internal
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::StoreUnavailable => "STORE_UNAVAILABLE",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            ok: false,
            code: self.code(),
            error: message,
        };
        (self.status(), Json(body)).into_response()
    }
}

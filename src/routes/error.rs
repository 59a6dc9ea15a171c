//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::document::{DocumentError, ErrorKind};

/// Handler result type
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error returned by document handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Document(DocumentError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout")
            }
            ApiError::Document(e) => match e.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                ErrorKind::LoadFailure => (StatusCode::UNPROCESSABLE_ENTITY, "load_failure"),
                ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, "invalid_argument"),
                ErrorKind::RenderFailure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "render_failure")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();

        if status.is_server_error() {
            tracing::error!("{}: {}", error_type, self);
        } else {
            tracing::debug!("{}: {}", error_type, self);
        }

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            details: if cfg!(debug_assertions) {
                Some(format!("{:?}", self))
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

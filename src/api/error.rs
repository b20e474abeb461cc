// src/api/error.rs

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::api::protocol::ErrorResponse;
use crate::errors::RundeckError;

/// Error returned by handlers; renders as `{success:false, error:{code,message}}`.
#[derive(Debug)]
pub enum ApiError {
    Rundeck(RundeckError),
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rundeck(err) => match err {
                RundeckError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
                RundeckError::NotFound(_) => StatusCode::NOT_FOUND,
                RundeckError::Busy { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::BadRequest(message) => ErrorResponse::new("invalid_request", message.clone()),
            ApiError::Rundeck(err) => ErrorResponse::new(err.code(), err.to_string()),
        }
    }
}

impl From<RundeckError> for ApiError {
    fn from(err: RundeckError) -> Self {
        ApiError::Rundeck(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        } else {
            debug!(status = status.as_u16(), error = ?self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use email_extraction::{DenialReason, JobError};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid caller identity")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota: Option<DenialReason>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Job(err) => match err {
                JobError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
                JobError::Parse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "parse_error"),
                JobError::CsvUploadNotAllowed => (StatusCode::FORBIDDEN, "csv_upload_not_allowed"),
                JobError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
                JobError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                JobError::NotReady { .. } => (StatusCode::CONFLICT, "not_ready"),
                JobError::Storage(_) | JobError::Export(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let quota = match &self {
            ApiError::Job(JobError::QuotaExceeded(reason)) => Some(reason.clone()),
            _ => None,
        };

        (
            status,
            Json(ErrorBody {
                error: code,
                message,
                quota,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

//! HTTP error taxonomy. Every failure surfaces as `{error, error_message}`
//! with a machine-readable code clients can key on.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vigil_core::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input, rejected before any cache or upstream interaction.
    #[error("{0}")]
    Validation(String),
    /// No usable credential on an endpoint that requires one.
    #[error("{0}")]
    Unauthenticated(String),
    /// The presented scoped token's policy denies this capability.
    #[error("the token does not grant access to this resource")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    /// A fetch against the upstream failed. Never cached; retried by the
    /// next caller.
    #[error("{0}")]
    Upstream(Arc<UpstreamError>),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Forbidden => "token_unauthorised",
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<Arc<UpstreamError>> for ApiError {
    fn from(err: Arc<UpstreamError>) -> Self {
        ApiError::Upstream(err)
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::Upstream(Arc::new(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    error_message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            error_message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

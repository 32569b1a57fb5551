//! API error type and `DropflowError` to HTTP status mapping.

use super::response;
use super::wire::{ErrorBody, ErrorDetail};
use bytes::Bytes;
use dropflow_core::error::{DropflowError, ErrorKind};
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// An error on its way to an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    /// Error code (e.g., "E202").
    pub code: &'static str,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: StatusCode,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(
        code: &'static str,
        kind: ErrorKind,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            status,
        }
    }

    /// Create a 400 Bad Request error for a body that could not be parsed.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            "E903",
            ErrorKind::Validation,
            message,
            StatusCode::BAD_REQUEST,
        )
    }

    /// The response body.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                kind: self.kind,
                message: self.message.clone(),
            },
        }
    }

    /// Convert to HTTP response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        response::json_response(self.status, &self.body())
    }
}

impl From<DropflowError> for ApiError {
    fn from(err: DropflowError) -> Self {
        let kind = err.kind();
        let status = match (&err, kind) {
            (DropflowError::SessionNotFound { .. }, _) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::State) => StatusCode::CONFLICT,
            (_, ErrorKind::Remote) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code: err.code(),
            kind,
            message: err.to_string(),
            status,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

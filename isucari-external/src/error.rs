//! Error responses of the simulators.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// A request the simulator refuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or inconsistent request
    #[error("{0}")]
    BadRequest(String),

    /// Missing or wrong `Authorization` header
    #[error("unauthorized")]
    Unauthorized,

    /// Caller not on the allow-list
    #[error("{0}")]
    Forbidden(String),

    /// Failure on our side
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    /// Shorthand for [`ApiError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// HTTP status of the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            tracing::error!(%message, "simulator internal error");
        }
        let message = self.to_string();
        (self.status(), Json(ErrorBody { error: &message })).into_response()
    }
}

/// Handler result.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

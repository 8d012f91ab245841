use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

/// Error taxonomy for the HTTP API
///
/// Every handler failure maps onto one of these variants; the response body is
/// always the same `{"error": "..."}` envelope with a matching status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No valid session
    #[error("session not found")]
    Unauthenticated,
    /// Session present but role check failed
    #[error("operation not permitted")]
    Forbidden,
    /// Missing, empty, or malformed request fields
    #[error("{0}")]
    InvalidArgument(String),
    /// The record store or object store failed
    #[error("backend unavailable")]
    BackendUnavailable,
}

/// Error response envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    /// Convenience constructor for validation failures
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "record store call failed");
        Self::BackendUnavailable
    }
}

impl From<tower_sessions::session::Error> for ApiError {
    fn from(e: tower_sessions::session::Error) -> Self {
        error!(error = %e, "session store call failed");
        Self::BackendUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::invalid("missing field").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BackendUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = ApiError::invalid("subject and message are required");
        assert_eq!(err.to_string(), "subject and message are required");
    }
}

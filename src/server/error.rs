//! Central mapping from failures to HTTP responses.
//!
//! Handlers return `Result<_, ApiError>`; the status code and the
//! `{"error", "code"}` body are decided here and nowhere else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use duckgate_engine::EngineError;
use serde::Serialize;
use tracing::{debug, error};

/// Standard error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: &'static str,
}

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The request body's content type has no codec.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The request itself is malformed (missing field, bad number, ...).
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Status code and error code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::TableNotFound(_) => (StatusCode::NOT_FOUND, "TABLE_NOT_FOUND"),
                EngineError::TableAlreadyExists(_) => {
                    (StatusCode::BAD_REQUEST, "TABLE_ALREADY_EXISTS")
                }
                EngineError::InvalidSchema(_) => (StatusCode::BAD_REQUEST, "INVALID_SCHEMA"),
                EngineError::InvalidIdentifier(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_IDENTIFIER")
                }
                EngineError::SchemaMismatch(_) => (StatusCode::BAD_REQUEST, "SCHEMA_MISMATCH"),
                EngineError::UnknownColumn(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_COLUMN"),
                EngineError::InvalidPivotSpec(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PIVOT_SPEC")
                }
                EngineError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "INVALID_FILTER"),
                EngineError::UnsupportedFormat(_) => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT")
                }
                EngineError::QueryError { .. } => (StatusCode::BAD_REQUEST, "QUERY_ERROR"),
                EngineError::EncodingFailure { .. } => {
                    (StatusCode::BAD_REQUEST, "ENCODING_FAILURE")
                }
                EngineError::QueryTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "QUERY_TIMEOUT"),
                EngineError::StoreUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                EngineError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            },
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Engine(EngineError::Io(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = match &self {
            // Local I/O details stay in the log.
            ApiError::Engine(EngineError::Io(e)) => {
                error!(error = %e, "Request failed with an I/O error");
                "Internal server error".to_string()
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                "Internal server error".to_string()
            }
            other => {
                debug!(status = status.as_u16(), code, error = %other, "Request rejected");
                other.to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().status().0
    }

    #[test]
    fn test_engine_error_statuses() {
        assert_eq!(status_of(EngineError::TableNotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(EngineError::TableAlreadyExists("t".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::InvalidPivotSpec("missing pivot_values".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::QueryTimeout { timeout_ms: 10 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(EngineError::StoreUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(EngineError::query("SELECT", "boom")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_error_statuses() {
        assert_eq!(
            status_of(ApiError::UnsupportedMediaType("text/plain".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(status_of(ApiError::bad_request("nope")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ApiError::Internal("join".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_body_carries_message_and_code() {
        let response = ApiError::from(EngineError::TableNotFound("orders".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "TABLE_NOT_FOUND");
        assert_eq!(json["error"], "Table not found: orders");
    }

    #[tokio::test]
    async fn test_io_details_are_not_leaked() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "/var/tmp/secret denied");
        let response = ApiError::from(io).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("/var/tmp"));
    }
}

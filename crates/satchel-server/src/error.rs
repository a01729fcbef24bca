//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The client presented a session that has expired.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Durable store error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<satchel_session::Error> for ServerError {
    fn from(e: satchel_session::Error) -> Self {
        use satchel_session::Error;

        match e {
            Error::SessionExpired(id) => ServerError::SessionExpired(id),
            Error::StoreUnavailable(msg) => ServerError::ServiceUnavailable(msg),
            Error::StoreOperationFailed(e) => ServerError::Storage(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::SessionExpired(_) => (StatusCode::UNAUTHORIZED, "session_expired"),
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = self.to_string();

        match &self {
            ServerError::Internal(_) | ServerError::Storage(_) => {
                tracing::error!(status = %status, code, error = %message, "Server error");
            }
            _ => {
                tracing::warn!(status = %status, code, error = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_map_to_status() {
        let cases = [
            (
                ServerError::from(satchel_session::Error::SessionExpired("abc".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServerError::from(satchel_session::Error::StoreUnavailable("closed".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServerError::from(satchel_session::Error::ValueAbsent("counter".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = ServerError::SessionExpired("abc".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], "session_expired");
        assert!(json["message"].as_str().unwrap().contains("abc"));
    }
}

//! Error types for the Swarm Accelerator server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::proxy::ForwardError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Body sent when the origin cannot be reached
pub const FORWARD_FAILURE_MESSAGE: &str = "An error occurred while forwarding the request.";

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Forwarding error: {0}")]
    Upstream(#[from] ForwardError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match &self {
            AppError::Upload(e) => {
                let status = e.status_code();
                if e.is_client_error() {
                    tracing::debug!("Rejected upload: {}", e);
                    (status, "bad_request", e.to_string(), None)
                } else {
                    tracing::error!("Upload failed: {}", e);
                    (
                        status,
                        "store_unavailable",
                        "Chunk store unavailable".to_string(),
                        Some(e.to_string()),
                    )
                }
            }
            AppError::Upstream(e) => {
                tracing::error!("Forwarding failed: {}", e);
                return (
                    StatusCode::BAD_GATEWAY,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    FORWARD_FAILURE_MESSAGE,
                )
                    .into_response();
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolError;
    use crate::store::StoreError;

    #[test]
    fn test_status_mapping() {
        let protocol = AppError::from(UploadError::from(ProtocolError::Truncated { remaining: 3 }));
        assert_eq!(protocol.into_response().status(), StatusCode::BAD_REQUEST);

        let store = AppError::from(UploadError::from(StoreError::Unavailable("down".to_string())));
        assert_eq!(store.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = AppError::from(UploadError::MissingHeader("swarm-postage-batch-id"));
        assert_eq!(missing.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_failure_is_plain_text() {
        let err = AppError::Upstream(ForwardError::InvalidOrigin {
            url: "x".to_string(),
            reason: "y".to_string(),
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}

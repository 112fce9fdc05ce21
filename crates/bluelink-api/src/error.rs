//! API error types and conversions

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bluelink_core::PortalError;
use serde::Serialize;

/// Message returned for every upstream failure
pub const GENERIC_FAILURE: &str = "Request to vehicle service failed";

/// API error type that converts to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request
    BadRequest(String),
    /// 401 Unauthorized
    Unauthorized,
    /// 429 Too Many Requests
    TooManyRequests,
    /// 500 caused by the portal; detail is logged, never returned
    Upstream(PortalError),
}

/// Standard error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid API key".to_string(),
            ),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                "Too many requests".to_string(),
            ),
            ApiError::Upstream(err) => {
                match &err {
                    PortalError::Status { status, body } => tracing::error!(
                        kind = err.kind(),
                        upstream_status = status,
                        upstream_body = %body,
                        "Upstream request failed"
                    ),
                    _ => tracing::error!(
                        kind = err.kind(),
                        error = %err,
                        "Upstream request failed"
                    ),
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_error",
                    GENERIC_FAILURE.to_string(),
                )
            }
        };

        if status.is_client_error() {
            tracing::debug!(error = error_type, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            error: error_type,
            message,
        });

        (status, body).into_response()
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        ApiError::Upstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::TooManyRequests, StatusCode::TOO_MANY_REQUESTS),
            (
                ApiError::Upstream(PortalError::Network("reset".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_server_errors_hide_upstream_detail() {
        let err = ApiError::from(PortalError::status(502, "secret upstream body"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "upstream_error");
        assert_eq!(body["message"], GENERIC_FAILURE);
    }

    #[test]
    fn test_every_portal_error_is_server_error() {
        let errors = [
            PortalError::Network("n".into()),
            PortalError::Decode("d".into()),
            PortalError::Credentials("c".into()),
            PortalError::NotFound("v".into()),
            PortalError::StaleSession("s".into()),
            PortalError::status(502, "bad gateway"),
            PortalError::Rejected("r".into()),
            PortalError::NotSupported("refresh".into()),
        ];
        for err in errors {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

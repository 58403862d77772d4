use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::headers;

/// Error types surfaced by the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Missing required 'service' query parameter")]
    MissingService,

    #[error("Unsupported token service '{0}'")]
    UnsupportedService(String),

    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),
}

/// Type alias for Result with GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingService | GatewayError::UnsupportedService(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Upstream(_) | GatewayError::InvalidUpstreamUrl(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingService | GatewayError::UnsupportedService(_) => "bad_request",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::InvalidUpstreamUrl(_) => "internal_error",
        }
    }
}

// Every error becomes a JSON response with the CORS set attached, so
// cross-origin clients see a parseable failure instead of an opaque
// network error.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "timestamp": timestamp,
        });

        let mut response = (
            self.status(),
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();
        headers::apply_cors(response.headers_mut());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_client_errors() {
        assert_eq!(GatewayError::MissingService.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::UnsupportedService("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_response_carries_cors() {
        let response = GatewayError::MissingService.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_unsupported_service_names_the_service() {
        let err = GatewayError::UnsupportedService("registry.example".into());
        assert!(err.to_string().contains("registry.example"));
    }
}

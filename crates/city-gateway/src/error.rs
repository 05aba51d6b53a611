//! Error types for the gateway crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by gateway HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request body failed validation.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Registration is closed for this resident kind.
    #[error("registration refused: {0}")]
    RegistrationRefused(String),

    /// The engine is unreachable (shutting down).
    #[error("engine unavailable")]
    EngineUnavailable,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Invalid(_) | Self::RegistrationRefused(_) => StatusCode::BAD_REQUEST,
            Self::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

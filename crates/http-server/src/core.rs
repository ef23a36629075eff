use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use db::services::{error::ServiceError, otp::OtpService};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

// Shared state for the handlers. One `OtpService` per process.
#[derive(Clone)]
pub struct AppState {
    pub otp: OtpService,
}

// Errors surfaced by the callable endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid-argument",
            ApiError::Service(e) => e.kind(),
        }
    }
}

// Callable-function status mapping: each error kind has a fixed HTTP status.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Service(ServiceError::InvalidArgument(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Service(e @ ServiceError::RateLimitExceeded) => {
                (StatusCode::TOO_MANY_REQUESTS, e.to_string())
            }
            ApiError::Service(e @ ServiceError::NotFound) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Service(e @ ServiceError::DeadlineExceeded) => {
                (StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
            ApiError::Service(ServiceError::DatabaseError(e)) => {
                error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected database error occurred.".to_string(),
                )
            }
        };

        if status.is_client_error() {
            info!(kind = self.kind(), %message, "Request rejected");
        }

        let body = Json(json!({
            "error": { "status": self.kind(), "message": message }
        }));
        (status, body).into_response()
    }
}

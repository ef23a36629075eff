use crate::api;
use crate::core::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Builds the callable-endpoint router over a shared `AppState`.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/sendSignupOtp", post(api::otp::send_signup_otp_handler))
        .route("/verifySignupOtp", post(api::otp::verify_signup_otp_handler))
        .route("/health", get(api::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

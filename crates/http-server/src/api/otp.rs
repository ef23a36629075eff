// POST endpoints /sendSignupOtp and /verifySignupOtp

use crate::core::{ApiError, AppState};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use db::models::otp::{OtpResponse, SendOtpRequest, VerifyOtpRequest};
use tracing::instrument;

/// Issues a signup code for the given email.
#[instrument(skip_all)]
pub async fn send_signup_otp_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<OtpResponse>, ApiError> {
    let Json(payload) = payload?;
    let email = required(payload.email, "A non-empty email is required.")?;

    // The code itself only goes to the notifier, never back to the caller.
    app_state.otp.issue(&email).await?;

    Ok(Json(OtpResponse::ok("OTP sent successfully")))
}

/// Consumes a signup code; a code verifies at most once.
#[instrument(skip_all)]
pub async fn verify_signup_otp_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<OtpResponse>, ApiError> {
    let Json(payload) = payload?;
    let email = required(payload.email, "Email and code are required.")?;
    let code = required(payload.code, "Email and code are required.")?;

    app_state.otp.verify(&email, &code).await?;

    Ok(Json(OtpResponse::ok("Email verified successfully")))
}

fn required(field: Option<String>, message: &str) -> Result<String, ApiError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::Validation(message.to_string())),
    }
}

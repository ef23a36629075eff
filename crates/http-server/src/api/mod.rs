use axum::Json;
use serde_json::{json, Value};

pub mod otp;

/// Liveness probe.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

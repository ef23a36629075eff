use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted signup code. Records are never updated in place, only deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpRecord {
    /// A record is expired once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Insert payload for a freshly generated code.
#[derive(Debug, Clone)]
pub struct NewOtpRecord {
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewOtpRecord {
    pub fn into_record(self) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            email: self.email,
            code: self.code,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

// DTO for the sendSignupOtp request
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: Option<String>,
}

// DTO for the verifySignupOtp request
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

// DTO shared by both endpoints on success
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtpResponse {
    pub success: bool,
    pub message: String,
}

impl OtpResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

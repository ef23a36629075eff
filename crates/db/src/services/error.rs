use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Too many OTP requests. Please try again later.")]
    RateLimitExceeded,

    #[error("Invalid OTP code.")]
    NotFound,

    #[error("OTP code has expired. Please request a new one.")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl ServiceError {
    /// The wire-level error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "invalid-argument",
            ServiceError::RateLimitExceeded => "resource-exhausted",
            ServiceError::NotFound => "not-found",
            ServiceError::DeadlineExceeded => "deadline-exceeded",
            ServiceError::DatabaseError(_) => "internal",
        }
    }
}

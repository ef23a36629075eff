use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("Failed to deliver OTP to {email}: {reason}")]
pub struct NotifyError {
    pub email: String,
    pub reason: String,
}

/// Hands an issued code to whatever delivers it to the user (email, SMS, ...).
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn deliver(&self, email: &str, code: &str) -> Result<(), NotifyError>;
}

/// Delivery stub: no message leaves the process, the hand-off is only logged.
///
/// With `reveal_codes` set the code itself goes into the log line, which is
/// the only way to complete a signup locally.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier {
    reveal_codes: bool,
}

impl LogNotifier {
    pub fn new(reveal_codes: bool) -> Self {
        Self { reveal_codes }
    }
}

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn deliver(&self, email: &str, code: &str) -> Result<(), NotifyError> {
        if self.reveal_codes {
            info!(email, code, "Signup OTP ready for delivery");
        } else {
            info!(email, "Signup OTP ready for delivery");
        }
        Ok(())
    }
}

use crate::models::otp::{NewOtpRecord, OtpRecord};
use crate::services::clock::Clock;
use crate::services::error::ServiceError;
use crate::services::generator::generate_otp_code;
use crate::services::notifier::OtpNotifier;
use crate::services::store::{Admission, OtpStore};
use chrono::Duration;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Lifetime and rate-limit settings for signup codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub rate_window: Duration,
    pub max_per_window: i64,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            rate_window: Duration::hours(1),
            max_per_window: 3,
        }
    }
}

/// Issues and verifies signup codes. Cheap to clone; every HTTP request and
/// every direct caller share the same store, notifier and clock.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    notifier: Arc<dyn OtpNotifier>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        notifier: Arc<dyn OtpNotifier>,
        clock: Arc<dyn Clock>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            policy,
        }
    }

    /// Creates a new code for `email` and hands it to the notifier.
    ///
    /// Fails with `RateLimitExceeded` once `max_per_window` codes were issued
    /// for the address within the trailing window; nothing is written then.
    /// Delivery runs detached and its outcome never affects the result.
    #[instrument(skip(self))]
    pub async fn issue(&self, email: &str) -> Result<OtpRecord, ServiceError> {
        let email = normalize_email(email)?;
        let now = self.clock.now();

        let new = NewOtpRecord {
            email,
            code: generate_otp_code(),
            created_at: now,
            expires_at: now + self.policy.ttl,
        };

        let record = match self
            .store
            .insert_within_limit(new, now - self.policy.rate_window, self.policy.max_per_window)
            .await?
        {
            Admission::Admitted(record) => record,
            Admission::Throttled { recent } => {
                warn!(recent, "OTP rate limit reached");
                return Err(ServiceError::RateLimitExceeded);
            }
        };

        let notifier = Arc::clone(&self.notifier);
        let (email, code) = (record.email.clone(), record.code.clone());
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&email, &code).await {
                warn!(error = %e, "OTP delivery failed");
            }
        });

        info!(id = %record.id, expires_at = %record.expires_at, "Signup OTP issued");
        Ok(record)
    }

    /// Consumes the most recent code matching `(email, code)`.
    ///
    /// The record is removed before the expiry check, so an expired code fails
    /// with `DeadlineExceeded` once and with `NotFound` afterwards.
    #[instrument(skip(self, code))]
    pub async fn verify(&self, email: &str, code: &str) -> Result<OtpRecord, ServiceError> {
        let email = normalize_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Email and code are required.".to_string(),
            ));
        }

        let record = self
            .store
            .take_latest(&email, code)
            .await?
            .ok_or(ServiceError::NotFound)?;

        if record.is_expired_at(self.clock.now()) {
            info!(id = %record.id, "Expired OTP presented and removed");
            return Err(ServiceError::DeadlineExceeded);
        }

        info!(id = %record.id, "Signup OTP verified");
        Ok(record)
    }

    /// Deletes records that expired without ever being verified, once they
    /// have also left the rate window and no longer count against it.
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        Ok(self
            .store
            .purge_expired(now, now - self.policy.rate_window)
            .await?)
    }
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "A non-empty email is required.".to_string(),
        ));
    }
    Ok(email.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::NotifyError;
    use crate::services::store::MemoryOtpStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Mutex::new(Utc::now()))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct ChannelNotifier(mpsc::UnboundedSender<(String, String)>);

    #[async_trait]
    impl OtpNotifier for ChannelNotifier {
        async fn deliver(&self, email: &str, code: &str) -> Result<(), NotifyError> {
            let _ = self.0.send((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl OtpNotifier for FailingNotifier {
        async fn deliver(&self, email: &str, _code: &str) -> Result<(), NotifyError> {
            Err(NotifyError {
                email: email.to_string(),
                reason: "mail relay unreachable".to_string(),
            })
        }
    }

    struct Harness {
        service: OtpService,
        store: Arc<MemoryOtpStore>,
        clock: Arc<ManualClock>,
        delivered: mpsc::UnboundedReceiver<(String, String)>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryOtpStore::new());
        let clock = Arc::new(ManualClock::new());
        let (tx, delivered) = mpsc::unbounded_channel();
        let service = OtpService::new(
            store.clone(),
            Arc::new(ChannelNotifier(tx)),
            clock.clone(),
            OtpPolicy::default(),
        );
        Harness {
            service,
            store,
            clock,
            delivered,
        }
    }

    #[tokio::test]
    async fn issue_persists_code_with_five_minute_expiry() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        assert_eq!(record.email, "a@x.com");
        assert_eq!(record.code.len(), 6);
        assert_eq!(record.expires_at - record.created_at, Duration::seconds(300));
        assert_eq!(h.store.records_for("a@x.com").await, vec![record]);
    }

    #[tokio::test]
    async fn issue_hands_code_to_notifier() {
        let mut h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        let (email, code) = h.delivered.recv().await.unwrap();
        assert_eq!(email, "a@x.com");
        assert_eq!(code, record.code);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_issue() {
        let store = Arc::new(MemoryOtpStore::new());
        let service = OtpService::new(
            store.clone(),
            Arc::new(FailingNotifier),
            Arc::new(ManualClock::new()),
            OtpPolicy::default(),
        );

        assert!(service.issue("a@x.com").await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn empty_email_is_rejected_without_a_write() {
        let h = harness();
        for email in ["", "   "] {
            let err = h.service.issue(email).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidArgument(_)));
        }
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn email_is_trimmed_and_lowercased() {
        let h = harness();
        let record = h.service.issue("  A@X.com ").await.unwrap();
        assert_eq!(record.email, "a@x.com");

        h.service.verify("a@x.COM", &record.code).await.unwrap();
    }

    #[tokio::test]
    async fn fourth_issue_within_the_hour_is_rate_limited() {
        let h = harness();
        for _ in 0..3 {
            h.service.issue("b@x.com").await.unwrap();
            h.clock.advance(Duration::minutes(10));
        }

        let err = h.service.issue("b@x.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimitExceeded));
        assert_eq!(h.store.records_for("b@x.com").await.len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_window_slides() {
        let h = harness();
        for _ in 0..3 {
            h.service.issue("b@x.com").await.unwrap();
        }
        assert!(h.service.issue("b@x.com").await.is_err());

        h.clock.advance(Duration::minutes(61));
        assert!(h.service.issue("b@x.com").await.is_ok());
    }

    #[tokio::test]
    async fn verify_succeeds_once() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        let verified = h.service.verify("a@x.com", &record.code).await.unwrap();
        assert_eq!(verified.id, record.id);

        let err = h.service.verify("a@x.com", &record.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn verify_at_the_expiry_instant_still_succeeds() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        h.clock.advance(Duration::minutes(5));
        assert!(h.service.verify("a@x.com", &record.code).await.is_ok());
    }

    #[tokio::test]
    async fn expired_code_fails_then_is_gone() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        h.clock.advance(Duration::minutes(5) + Duration::seconds(1));
        let err = h.service.verify("a@x.com", &record.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::DeadlineExceeded));
        assert!(h.store.records_for("a@x.com").await.is_empty());

        let err = h.service.verify("a@x.com", &record.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn unknown_pair_is_not_found() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();
        let wrong = if record.code == "100000" { "100001" } else { "100000" };

        assert!(matches!(
            h.service.verify("a@x.com", wrong).await.unwrap_err(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            h.service.verify("nobody@x.com", &record.code).await.unwrap_err(),
            ServiceError::NotFound
        ));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn verify_requires_email_and_code() {
        let h = harness();
        assert!(matches!(
            h.service.verify("", "123456").await.unwrap_err(),
            ServiceError::InvalidArgument(_)
        ));
        assert!(matches!(
            h.service.verify("a@x.com", " ").await.unwrap_err(),
            ServiceError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn older_codes_stay_valid_until_used_or_expired() {
        let h = harness();
        let first = h.service.issue("a@x.com").await.unwrap();
        h.clock.advance(Duration::minutes(1));
        let second = h.service.issue("a@x.com").await.unwrap();

        h.service.verify("a@x.com", &second.code).await.unwrap();
        if first.code != second.code {
            h.service.verify("a@x.com", &first.code).await.unwrap();
        }
    }

    #[tokio::test]
    async fn concurrent_verifies_succeed_exactly_once() {
        let h = harness();
        let record = h.service.issue("a@x.com").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                let code = record.code.clone();
                tokio::spawn(async move { service.verify("a@x.com", &code).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, ServiceError::NotFound)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn concurrent_issues_respect_the_cap() {
        let h = harness();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move { service.issue("c@x.com").await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(h.store.records_for("c@x.com").await.len(), 3);
    }

    #[tokio::test]
    async fn purge_drops_abandoned_codes_once_outside_the_window() {
        let h = harness();
        h.service.issue("a@x.com").await.unwrap();
        h.clock.advance(Duration::minutes(58));
        h.service.issue("b@x.com").await.unwrap();

        h.clock.advance(Duration::minutes(3));
        assert_eq!(h.service.purge_expired().await.unwrap(), 1);
        assert!(h.store.records_for("a@x.com").await.is_empty());
        assert_eq!(h.store.records_for("b@x.com").await.len(), 1);
    }

    #[tokio::test]
    async fn purge_keeps_the_rate_limit_intact() {
        let h = harness();
        for _ in 0..3 {
            h.service.issue("b@x.com").await.unwrap();
        }

        h.clock.advance(Duration::minutes(6));
        assert_eq!(h.service.purge_expired().await.unwrap(), 0);
        assert_eq!(h.store.records_for("b@x.com").await.len(), 3);

        let err = h.service.issue("b@x.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimitExceeded));
    }
}

use crate::models::otp::{NewOtpRecord, OtpRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Outcome of a rate-limited insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(OtpRecord),
    /// Nothing was written; `recent` records already exist in the window.
    Throttled { recent: i64 },
}

/// Persistence for OTP records.
///
/// Both write paths are atomic per email: two concurrent inserts cannot both
/// slip under the limit, and a record is handed out by `take_latest` at most once.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Inserts `new` unless `max_per_window` records for the same email were
    /// created at or after `window_start`.
    async fn insert_within_limit(
        &self,
        new: NewOtpRecord,
        window_start: DateTime<Utc>,
        max_per_window: i64,
    ) -> Result<Admission, sqlx::Error>;

    /// Removes and returns the most recently created record matching `(email, code)`.
    async fn take_latest(&self, email: &str, code: &str) -> Result<Option<OtpRecord>, sqlx::Error>;

    /// Deletes records that expired before `now` and were created before
    /// `created_before`. Records still inside the rate window are kept so the
    /// sweep never frees up admissions.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>;
}

/// In-process store for local runs and tests. A single lock guards every
/// operation, which gives the same per-email atomicity as the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: Mutex<Vec<OtpRecord>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all records currently held for `email`, oldest first.
    pub async fn records_for(&self, email: &str) -> Vec<OtpRecord> {
        let records = self.records.lock().await;
        let mut matching: Vec<OtpRecord> = records
            .iter()
            .filter(|r| r.email == email)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn insert_within_limit(
        &self,
        new: NewOtpRecord,
        window_start: DateTime<Utc>,
        max_per_window: i64,
    ) -> Result<Admission, sqlx::Error> {
        let mut records = self.records.lock().await;
        let recent = records
            .iter()
            .filter(|r| r.email == new.email && r.created_at >= window_start)
            .count() as i64;
        if recent >= max_per_window {
            return Ok(Admission::Throttled { recent });
        }

        let record = new.into_record();
        records.push(record.clone());
        Ok(Admission::Admitted(record))
    }

    async fn take_latest(&self, email: &str, code: &str) -> Result<Option<OtpRecord>, sqlx::Error> {
        let mut records = self.records.lock().await;
        let latest = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.email == email && r.code == code)
            .max_by_key(|(_, r)| r.created_at)
            .map(|(idx, _)| idx);

        Ok(latest.map(|idx| records.swap_remove(idx)))
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| !(r.is_expired_at(now) && r.created_at < created_before));
        Ok((before - records.len()) as u64)
    }
}

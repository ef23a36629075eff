use crate::models::otp::{NewOtpRecord, OtpRecord};
use crate::services::store::{Admission, OtpStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// PostgreSQL-backed store over the `otp_records` table.
#[derive(Debug, Clone)]
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    /// The count and the insert share one transaction holding an advisory lock
    /// keyed on the email, so concurrent issues for one address serialize here.
    async fn insert_within_limit(
        &self,
        new: NewOtpRecord,
        window_start: DateTime<Utc>,
        max_per_window: i64,
    ) -> Result<Admission, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&new.email)
            .execute(&mut *tx)
            .await?;

        let recent: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM otp_records
            WHERE email = $1 AND created_at >= $2
            "#,
        )
        .bind(&new.email)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;

        if recent >= max_per_window {
            tx.rollback().await?;
            debug!(recent, "Rate limit window full, nothing written");
            return Ok(Admission::Throttled { recent });
        }

        let record = new.into_record();
        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
            INSERT INTO otp_records (id, email, code, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, code, created_at, expires_at
            "#,
        )
        .bind(record.id)
        .bind(&record.email)
        .bind(&record.code)
        .bind(record.created_at)
        .bind(record.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Admission::Admitted(record))
    }

    /// Select and delete happen in one statement. A concurrent taker that picked
    /// the same row blocks on it and then deletes nothing, so exactly one caller
    /// gets the record back.
    async fn take_latest(&self, email: &str, code: &str) -> Result<Option<OtpRecord>, sqlx::Error> {
        sqlx::query_as::<_, OtpRecord>(
            r#"
            DELETE FROM otp_records
            WHERE id = (
                SELECT id
                FROM otp_records
                WHERE email = $1 AND code = $2
                ORDER BY created_at DESC
                LIMIT 1
            )
            RETURNING id, email, code, created_at, expires_at
            "#,
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM otp_records WHERE expires_at < $1 AND created_at < $2")
                .bind(now)
                .bind(created_before)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

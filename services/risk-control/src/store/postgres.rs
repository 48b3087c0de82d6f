use super::RiskControlStore;
use crate::errors::{RiskControlError, RiskResult};
use crate::metrics::STORE_ERRORS_TOTAL;
use crate::models::{RiskControlRecord, RiskControlRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

const SELECT_COLUMNS: &str =
    "SELECT user_id, status, level, auto_release_at, updated_at, evidence_through FROM risk_controls";

pub struct PgRiskControlStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgRiskControlStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        PgRiskControlStore { pool, timeout }
    }
}

/// Bounds a database call by `timeout`. A timeout is reported as `StoreUnavailable`.
/// Every failure is counted under `operation` and logged.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    query: F,
) -> RiskResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let result = match tokio::time::timeout(timeout, query).await {
        Ok(result) => result.map_err(RiskControlError::from),
        Err(_) => Err(RiskControlError::StoreUnavailable(format!(
            "{} timed out after {}ms",
            operation,
            timeout.as_millis()
        ))),
    };

    if let Err(ref e) = result {
        STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
        tracing::error!(operation, error = %e, "Store call failed");
    }
    result
}

#[async_trait]
impl RiskControlStore for PgRiskControlStore {
    async fn get(&self, user_id: &str) -> RiskResult<Option<RiskControlRecord>> {
        let sql = format!("{} WHERE user_id = $1", SELECT_COLUMNS);
        let row = bounded(
            self.timeout,
            "get",
            sqlx::query_as::<_, RiskControlRow>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(RiskControlRecord::from))
    }

    async fn upsert(&self, record: &RiskControlRecord) -> RiskResult<()> {
        let row = RiskControlRow::from(record);
        bounded(
            self.timeout,
            "upsert",
            sqlx::query(
                "INSERT INTO risk_controls
                     (user_id, status, level, auto_release_at, updated_at, evidence_through)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (user_id) DO UPDATE
                 SET status = EXCLUDED.status,
                     level = EXCLUDED.level,
                     auto_release_at = EXCLUDED.auto_release_at,
                     updated_at = EXCLUDED.updated_at,
                     evidence_through = EXCLUDED.evidence_through",
            )
            .bind(&row.user_id)
            .bind(&row.status)
            .bind(row.level)
            .bind(row.auto_release_at)
            .bind(row.updated_at)
            .bind(row.evidence_through)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn insert_if_absent(&self, record: &RiskControlRecord) -> RiskResult<bool> {
        let row = RiskControlRow::from(record);
        let result = bounded(
            self.timeout,
            "insert_if_absent",
            sqlx::query(
                "INSERT INTO risk_controls
                     (user_id, status, level, auto_release_at, updated_at, evidence_through)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(&row.user_id)
            .bind(&row.status)
            .bind(row.level)
            .bind(row.auto_release_at)
            .bind(row.updated_at)
            .bind(row.evidence_through)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set(
        &self,
        expected_updated_at: DateTime<Utc>,
        next: &RiskControlRecord,
    ) -> RiskResult<bool> {
        let row = RiskControlRow::from(next);
        let result = bounded(
            self.timeout,
            "compare_and_set",
            sqlx::query(
                "UPDATE risk_controls
                 SET status = $2, level = $3, auto_release_at = $4, updated_at = $5,
                     evidence_through = $6
                 WHERE user_id = $1 AND updated_at = $7",
            )
            .bind(&row.user_id)
            .bind(&row.status)
            .bind(row.level)
            .bind(row.auto_release_at)
            .bind(row.updated_at)
            .bind(row.evidence_through)
            .bind(expected_updated_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_restricted(&self) -> RiskResult<Vec<RiskControlRecord>> {
        let sql = format!("{} WHERE status = 'restricted' ORDER BY user_id", SELECT_COLUMNS);
        let rows = bounded(
            self.timeout,
            "list_restricted",
            sqlx::query_as::<_, RiskControlRow>(&sql).fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.into_iter().map(RiskControlRecord::from).collect())
    }

    async fn ping(&self) -> RiskResult<()> {
        bounded(
            self.timeout,
            "ping",
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

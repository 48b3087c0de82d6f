use super::{ActivityMetrics, DailyActivity, SuspiciousTotal};
use crate::errors::RiskResult;
use crate::store::postgres::bounded;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use std::time::Duration;

/// Reads `user_daily_metrics`, which is maintained by the analytics pipeline.
pub struct PgActivityMetrics {
    pool: PgPool,
    timeout: Duration,
}

impl PgActivityMetrics {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        PgActivityMetrics { pool, timeout }
    }
}

#[async_trait]
impl ActivityMetrics for PgActivityMetrics {
    async fn daily(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RiskResult<Vec<DailyActivity>> {
        let query = sqlx::query_as::<_, DailyActivity>(
            "SELECT user_id, day, failed_payments, refunds, late_night_payments, suspicious_activity
             FROM user_daily_metrics
             WHERE user_id = $1 AND day BETWEEN $2 AND $3
             ORDER BY day",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool);

        bounded(self.timeout, "metrics_daily", query).await
    }

    async fn suspicious_totals(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        min_total: i64,
    ) -> RiskResult<Vec<SuspiciousTotal>> {
        let query = sqlx::query_as::<_, SuspiciousTotal>(
            "SELECT user_id, SUM(suspicious_activity)::BIGINT AS total
             FROM user_daily_metrics
             WHERE day BETWEEN $1 AND $2
             GROUP BY user_id
             HAVING SUM(suspicious_activity) >= $3
             ORDER BY user_id",
        )
        .bind(from)
        .bind(to)
        .bind(min_total)
        .fetch_all(&self.pool);

        bounded(self.timeout, "metrics_suspicious_totals", query).await
    }
}

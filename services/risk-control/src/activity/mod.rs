//! Read-only access to the per-user daily activity aggregates.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryActivityMetrics;
pub use postgres::PgActivityMetrics;

use crate::errors::RiskResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One user's aggregates for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyActivity {
    pub user_id: String,
    pub day: NaiveDate,
    pub failed_payments: i32,
    pub refunds: i32,
    pub late_night_payments: i32,
    pub suspicious_activity: i32,
}

impl DailyActivity {
    pub fn is_suspicious(&self) -> bool {
        self.suspicious_activity > 0
    }
}

/// Summed suspicious activity of one user over a window.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SuspiciousTotal {
    pub user_id: String,
    pub total: i64,
}

#[async_trait]
pub trait ActivityMetrics: Send + Sync {
    /// Daily rows for `user_id` with `from <= day <= to`, oldest first.
    async fn daily(&self, user_id: &str, from: NaiveDate, to: NaiveDate)
        -> RiskResult<Vec<DailyActivity>>;

    /// Users whose suspicious count summed over `from..=to` is at least `min_total`.
    async fn suspicious_totals(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        min_total: i64,
    ) -> RiskResult<Vec<SuspiciousTotal>>;
}

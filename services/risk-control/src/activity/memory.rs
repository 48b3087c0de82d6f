use super::{ActivityMetrics, DailyActivity, SuspiciousTotal};
use crate::errors::{RiskControlError, RiskResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryActivityMetrics {
    rows: Arc<RwLock<Vec<DailyActivity>>>,
    failing_users: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryActivityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, activity: DailyActivity) {
        let mut rows = self.rows.write().await;
        rows.retain(|r| !(r.user_id == activity.user_id && r.day == activity.day));
        rows.push(activity);
    }

    /// Convenience for tests that only care about the suspicious counter.
    pub async fn record_suspicious(&self, user_id: &str, day: NaiveDate, count: i32) {
        self.record(DailyActivity {
            user_id: user_id.to_string(),
            day,
            failed_payments: 0,
            refunds: 0,
            late_night_payments: 0,
            suspicious_activity: count,
        })
        .await;
    }

    /// Lookups for `user_id` fail, to exercise per-user sweep failures.
    pub async fn fail_for(&self, user_id: &str) {
        self.failing_users.write().await.insert(user_id.to_string());
    }
}

#[async_trait]
impl ActivityMetrics for InMemoryActivityMetrics {
    async fn daily(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RiskResult<Vec<DailyActivity>> {
        if self.failing_users.read().await.contains(user_id) {
            return Err(RiskControlError::StoreUnavailable(format!(
                "metrics unavailable for {}",
                user_id
            )));
        }

        let mut rows: Vec<_> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && r.day >= from && r.day <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.day);
        Ok(rows)
    }

    async fn suspicious_totals(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        min_total: i64,
    ) -> RiskResult<Vec<SuspiciousTotal>> {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for row in self.rows.read().await.iter() {
            if row.day >= from && row.day <= to {
                *totals.entry(row.user_id.clone()).or_default() += row.suspicious_activity as i64;
            }
        }

        Ok(totals
            .into_iter()
            .filter(|(_, total)| *total >= min_total)
            .map(|(user_id, total)| SuspiciousTotal { user_id, total })
            .collect())
    }
}

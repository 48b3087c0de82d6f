//! Persistence of risk control records.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemoryRiskControlStore;
pub use postgres::PgRiskControlStore;

use crate::errors::RiskResult;
use crate::models::RiskControlRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RiskControlStore: Send + Sync {
    /// At most one record per user. `None` means normal, level 0.
    async fn get(&self, user_id: &str) -> RiskResult<Option<RiskControlRecord>>;

    /// Insert or fully overwrite the record.
    async fn upsert(&self, record: &RiskControlRecord) -> RiskResult<()>;

    /// Insert only when no row exists. Returns `false` if one already did.
    async fn insert_if_absent(&self, record: &RiskControlRecord) -> RiskResult<bool>;

    /// Overwrite status, level, timer and `updated_at` only if the stored
    /// `updated_at` still equals `expected_updated_at`. Returns `false` on a lost race.
    async fn compare_and_set(
        &self,
        expected_updated_at: DateTime<Utc>,
        next: &RiskControlRecord,
    ) -> RiskResult<bool>;

    /// Every record whose status is `restricted`.
    async fn list_restricted(&self) -> RiskResult<Vec<RiskControlRecord>>;

    async fn ping(&self) -> RiskResult<()>;
}

use super::RiskControlStore;
use crate::errors::{RiskControlError, RiskResult};
use crate::models::RiskControlRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store used by tests and by `store.backend = "memory"`.
#[derive(Clone, Default)]
pub struct InMemoryRiskControlStore {
    records: Arc<RwLock<HashMap<String, RiskControlRecord>>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRiskControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_records(records: impl IntoIterator<Item = RiskControlRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write().await;
            for record in records {
                map.insert(record.user_id.clone(), record);
            }
        }
        store
    }

    /// Make every call fail with `StoreUnavailable`, to exercise fail-closed paths.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> RiskResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RiskControlError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RiskControlStore for InMemoryRiskControlStore {
    async fn get(&self, user_id: &str) -> RiskResult<Option<RiskControlRecord>> {
        self.check_online()?;
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, record: &RiskControlRecord) -> RiskResult<()> {
        self.check_online()?;
        self.records
            .write()
            .await
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn insert_if_absent(&self, record: &RiskControlRecord) -> RiskResult<bool> {
        self.check_online()?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.user_id) {
            return Ok(false);
        }
        records.insert(record.user_id.clone(), record.clone());
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        expected_updated_at: DateTime<Utc>,
        next: &RiskControlRecord,
    ) -> RiskResult<bool> {
        self.check_online()?;
        let mut records = self.records.write().await;
        match records.get_mut(&next.user_id) {
            Some(current) if current.updated_at == expected_updated_at => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_restricted(&self) -> RiskResult<Vec<RiskControlRecord>> {
        self.check_online()?;
        let mut restricted: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.state.is_restricted())
            .cloned()
            .collect();
        restricted.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(restricted)
    }

    async fn ping(&self) -> RiskResult<()> {
        self.check_online()
    }
}

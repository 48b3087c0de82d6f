use super::{InMemoryRiskControlStore, RiskControlStore};
use crate::errors::RiskResult;
use crate::models::{RiskControlRecord, RiskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Writes `concurrent` behind the caller's back just before its first compare-and-set.
pub(crate) struct InterleavingStore {
    pub inner: InMemoryRiskControlStore,
    concurrent: RiskState,
    writes: AtomicUsize,
}

impl InterleavingStore {
    pub fn new(inner: InMemoryRiskControlStore, concurrent: RiskState) -> Self {
        InterleavingStore {
            inner,
            concurrent,
            writes: AtomicUsize::new(0),
        }
    }

    /// Compare-and-set calls seen so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn interleave(&self, user_id: &str) -> RiskResult<()> {
        if let Some(current) = self.inner.get(user_id).await? {
            let concurrent = current.transition(self.concurrent.clone(), current.updated_at);
            self.inner
                .compare_and_set(current.updated_at, &concurrent)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RiskControlStore for InterleavingStore {
    async fn get(&self, user_id: &str) -> RiskResult<Option<RiskControlRecord>> {
        self.inner.get(user_id).await
    }

    async fn upsert(&self, record: &RiskControlRecord) -> RiskResult<()> {
        self.inner.upsert(record).await
    }

    async fn insert_if_absent(&self, record: &RiskControlRecord) -> RiskResult<bool> {
        self.inner.insert_if_absent(record).await
    }

    async fn compare_and_set(
        &self,
        expected_updated_at: DateTime<Utc>,
        next: &RiskControlRecord,
    ) -> RiskResult<bool> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
            self.interleave(&next.user_id).await?;
        }
        self.inner.compare_and_set(expected_updated_at, next).await
    }

    async fn list_restricted(&self) -> RiskResult<Vec<RiskControlRecord>> {
        self.inner.list_restricted().await
    }

    async fn ping(&self) -> RiskResult<()> {
        self.inner.ping().await
    }
}

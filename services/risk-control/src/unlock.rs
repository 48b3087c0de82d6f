use crate::errors::{RiskControlError, RiskResult};
use crate::metrics::TRANSITIONS_TOTAL;
use crate::models::RiskControlRecord;
use crate::store::RiskControlStore;
use crate::transitions::unlocked;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: usize = 3;

/// Administrator override. The only path that clears a level-3 restriction.
pub struct ManualUnlock {
    store: Arc<dyn RiskControlStore>,
}

impl ManualUnlock {
    pub fn new(store: Arc<dyn RiskControlStore>) -> Self {
        ManualUnlock { store }
    }

    pub async fn unlock(&self, user_id: &str, actor: &str) -> RiskResult<RiskControlRecord> {
        self.unlock_at(user_id, actor, Utc::now()).await
    }

    /// Resets an existing record to normal, level 1, no timer, whatever state it is
    /// in. A concurrent write is re-read and overridden, never rewound.
    pub async fn unlock_at(
        &self,
        user_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskControlRecord> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.store.get(user_id).await?.ok_or_else(|| {
                RiskControlError::NotFound(format!("no risk control record for user {}", user_id))
            })?;

            let record = current.transition(unlocked(), now);
            if !self
                .store
                .compare_and_set(current.updated_at, &record)
                .await?
            {
                debug!(user_id, attempt, "Record changed during unlock, re-reading");
                continue;
            }

            TRANSITIONS_TOTAL.with_label_values(&["unlock"]).inc();
            info!(
                user_id,
                actor,
                previous_status = current.state.status().as_str(),
                previous_level = current.state.level(),
                "Risk control manually unlocked"
            );
            return Ok(record);
        }

        warn!(user_id, actor, "Giving up on unlock after repeated write conflicts");
        Err(RiskControlError::Contention(user_id.to_string()))
    }
}

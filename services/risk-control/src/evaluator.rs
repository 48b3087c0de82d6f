use crate::errors::{RiskControlError, RiskResult};
use crate::metrics::{AUTO_RELEASES_TOTAL, RISK_CHECKS_TOTAL};
use crate::models::RiskDecision;
use crate::store::RiskControlStore;
use crate::transitions::{judge, Verdict};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads racing a concurrent writer are retried this many times before giving up.
const MAX_ATTEMPTS: usize = 3;

/// Decides whether a user may pay right now, lifting expired restrictions on the way.
pub struct RiskEvaluator {
    store: Arc<dyn RiskControlStore>,
}

impl RiskEvaluator {
    pub fn new(store: Arc<dyn RiskControlStore>) -> Self {
        RiskEvaluator { store }
    }

    pub async fn check_allowed(&self, user_id: &str) -> RiskResult<RiskDecision> {
        self.check_allowed_at(user_id, Utc::now()).await
    }

    pub async fn check_allowed_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskDecision> {
        let result = self.evaluate(user_id, now).await;

        let outcome = match &result {
            Ok(RiskDecision::Allowed) => "allowed",
            Ok(RiskDecision::Denied(_)) => "denied",
            Err(_) => "error",
        };
        RISK_CHECKS_TOTAL.with_label_values(&[outcome]).inc();

        result
    }

    async fn evaluate(&self, user_id: &str, now: DateTime<Utc>) -> RiskResult<RiskDecision> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Some(record) = self.store.get(user_id).await? else {
                return Ok(RiskDecision::Allowed);
            };

            match judge(&record.state, now) {
                Verdict::Allow => return Ok(RiskDecision::Allowed),
                Verdict::Deny(denial) => {
                    debug!(user_id, level = denial.level, "Payment restricted");
                    return Ok(RiskDecision::Denied(denial));
                }
                Verdict::Release(next) => {
                    let released = record.transition(next, now);
                    if self
                        .store
                        .compare_and_set(record.updated_at, &released)
                        .await?
                    {
                        AUTO_RELEASES_TOTAL.inc();
                        info!(
                            user_id,
                            level = released.state.level(),
                            "Restriction auto-released"
                        );
                        return Ok(RiskDecision::Allowed);
                    }
                    debug!(user_id, attempt, "Record changed during auto-release, re-reading");
                }
            }
        }

        warn!(user_id, "Giving up on risk check after repeated write conflicts");
        Err(RiskControlError::Contention(user_id.to_string()))
    }
}

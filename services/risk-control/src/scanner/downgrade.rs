use super::{SweepLock, SweepOutcome, SweepReport};
use crate::activity::{ActivityMetrics, DailyActivity};
use crate::errors::RiskResult;
use crate::metrics::TRANSITIONS_TOTAL;
use crate::models::RiskControlRecord;
use crate::policy::RiskPolicy;
use crate::store::RiskControlStore;
use crate::transitions::step_down;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

const SCANNER: &str = "downgrade";

/// Lowers every restricted user one level once their lookback window is clean.
pub struct DowngradeScanner {
    store: Arc<dyn RiskControlStore>,
    activity: Arc<dyn ActivityMetrics>,
    policy: RiskPolicy,
    lock: SweepLock,
}

impl DowngradeScanner {
    pub fn new(
        store: Arc<dyn RiskControlStore>,
        activity: Arc<dyn ActivityMetrics>,
        policy: RiskPolicy,
    ) -> Self {
        DowngradeScanner {
            store,
            activity,
            policy,
            lock: SweepLock::new(SCANNER),
        }
    }

    pub async fn run(&self) -> RiskResult<SweepReport> {
        self.run_at(Utc::now()).await
    }

    /// Fails as a whole only when the restricted set cannot be read.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RiskResult<SweepReport> {
        let _guard = self.lock.try_acquire()?;
        let restricted = self.store.list_restricted().await?;
        let today = now.date_naive();

        let mut report = SweepReport::new(SCANNER, now);
        for record in restricted {
            let outcome = match self.downgrade_one(&record, today, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(user_id = %record.user_id, error = %e, "Downgrade failed for user");
                    SweepOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.push(record.user_id, outcome);
        }

        info!(
            scanned = report.results.len(),
            downgraded = report.count("downgraded"),
            failed = report.count("failed"),
            "Downgrade sweep finished"
        );
        Ok(report)
    }

    async fn downgrade_one(
        &self,
        record: &RiskControlRecord,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> RiskResult<SweepOutcome> {
        let window = self.policy.lookback_days(record.state.level());
        let from = today - Duration::days(window);
        let activity = self.activity.daily(&record.user_id, from, today).await?;

        if activity.iter().any(DailyActivity::is_suspicious) {
            return Ok(SweepOutcome::Unchanged {
                reason: "recent_suspicious_activity",
            });
        }

        let Some(next) = step_down(&record.state, &self.policy, now) else {
            return Ok(SweepOutcome::Unchanged {
                reason: "not_restricted",
            });
        };

        let from_level = record.state.level();
        let updated = record.transition(next, now);
        if !self
            .store
            .compare_and_set(record.updated_at, &updated)
            .await?
        {
            return Ok(SweepOutcome::Conflict);
        }

        TRANSITIONS_TOTAL.with_label_values(&["downgrade"]).inc();
        info!(
            user_id = %record.user_id,
            from = from_level,
            to = updated.state.level(),
            "Restriction downgraded"
        );
        Ok(SweepOutcome::Downgraded {
            from: from_level,
            to: updated.state.level(),
        })
    }
}

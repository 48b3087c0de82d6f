use super::{SweepLock, SweepOutcome, SweepReport};
use crate::activity::ActivityMetrics;
use crate::errors::{RiskControlError, RiskResult};
use crate::metrics::TRANSITIONS_TOTAL;
use crate::models::{RiskControlRecord, RiskState};
use crate::policy::RiskPolicy;
use crate::store::RiskControlStore;
use crate::transitions::step_up;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCANNER: &str = "escalation";
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    Escalated {
        record: RiskControlRecord,
        from_level: i16,
    },
    AlreadyLocked,
}

/// Raises restriction levels, either on demand or from daily suspicious-activity totals.
pub struct EscalationScanner {
    store: Arc<dyn RiskControlStore>,
    activity: Arc<dyn ActivityMetrics>,
    policy: RiskPolicy,
    lock: SweepLock,
}

impl EscalationScanner {
    pub fn new(
        store: Arc<dyn RiskControlStore>,
        activity: Arc<dyn ActivityMetrics>,
        policy: RiskPolicy,
    ) -> Self {
        EscalationScanner {
            store,
            activity,
            policy,
            lock: SweepLock::new(SCANNER),
        }
    }

    pub async fn escalate(&self, user_id: &str, severe: bool) -> RiskResult<EscalationOutcome> {
        self.escalate_at(user_id, severe, Utc::now()).await
    }

    /// Level + 1 (capped at 3), or straight to 3 when `severe`. Creates the record on
    /// first escalation. Activity up to today counts as applied.
    pub async fn escalate_at(
        &self,
        user_id: &str,
        severe: bool,
        now: DateTime<Utc>,
    ) -> RiskResult<EscalationOutcome> {
        self.apply(user_id, severe, now, now.date_naive()).await
    }

    async fn apply(
        &self,
        user_id: &str,
        severe: bool,
        now: DateTime<Utc>,
        evidence_through: NaiveDate,
    ) -> RiskResult<EscalationOutcome> {
        for attempt in 1..=MAX_ATTEMPTS {
            let existing = self.store.get(user_id).await?;
            let current = existing
                .as_ref()
                .map_or(RiskState::CLEAN, |record| record.state.clone());

            let Some(next) = step_up(&current, &self.policy, now, severe) else {
                return Ok(EscalationOutcome::AlreadyLocked);
            };

            let (record, written) = match existing {
                None => {
                    let record = RiskControlRecord::new(user_id, next, now)
                        .with_evidence_through(evidence_through);
                    let written = self.store.insert_if_absent(&record).await?;
                    (record, written)
                }
                Some(previous) => {
                    let record = previous
                        .transition(next, now)
                        .with_evidence_through(evidence_through);
                    let written = self
                        .store
                        .compare_and_set(previous.updated_at, &record)
                        .await?;
                    (record, written)
                }
            };

            if written {
                TRANSITIONS_TOTAL.with_label_values(&["escalate"]).inc();
                info!(
                    user_id,
                    from = current.level(),
                    to = record.state.level(),
                    auto_release_at = ?record.state.auto_release_at(),
                    "Restriction escalated"
                );
                return Ok(EscalationOutcome::Escalated {
                    record,
                    from_level: current.level(),
                });
            }
            debug!(user_id, attempt, "Record changed during escalation, re-reading");
        }

        warn!(user_id, "Giving up on escalation after repeated write conflicts");
        Err(RiskControlError::Contention(user_id.to_string()))
    }

    pub async fn run(&self) -> RiskResult<SweepReport> {
        self.run_at(Utc::now()).await
    }

    /// Escalates users whose suspicious activity over the evidence window (ending
    /// yesterday) reaches the threshold.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RiskResult<SweepReport> {
        let _guard = self.lock.try_acquire()?;
        let thresholds = &self.policy.escalation;
        let evidence_end = now.date_naive() - Duration::days(1);
        let evidence_start = evidence_end - Duration::days(thresholds.window_days - 1);

        let candidates = self
            .activity
            .suspicious_totals(evidence_start, evidence_end, thresholds.suspicious_threshold)
            .await?;

        let mut report = SweepReport::new(SCANNER, now);
        for candidate in candidates {
            let outcome = match self
                .escalate_candidate(&candidate.user_id, evidence_start, evidence_end, now)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(user_id = %candidate.user_id, error = %e, "Escalation failed for user");
                    SweepOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.push(candidate.user_id, outcome);
        }

        info!(
            candidates = report.results.len(),
            escalated = report.count("escalated"),
            failed = report.count("failed"),
            "Escalation sweep finished"
        );
        Ok(report)
    }

    async fn escalate_candidate(
        &self,
        user_id: &str,
        evidence_start: NaiveDate,
        evidence_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> RiskResult<SweepOutcome> {
        let from = match self
            .store
            .get(user_id)
            .await?
            .and_then(|record| record.first_unapplied_day())
        {
            Some(first_unapplied) => evidence_start.max(first_unapplied),
            None => evidence_start,
        };
        if from > evidence_end {
            return Ok(SweepOutcome::Unchanged {
                reason: "evidence_already_applied",
            });
        }

        let total: i64 = self
            .activity
            .daily(user_id, from, evidence_end)
            .await?
            .iter()
            .map(|day| day.suspicious_activity as i64)
            .sum();

        let thresholds = &self.policy.escalation;
        if total < thresholds.suspicious_threshold {
            return Ok(SweepOutcome::Unchanged {
                reason: "below_threshold",
            });
        }

        let severe = total >= thresholds.severe_threshold;
        match self.apply(user_id, severe, now, evidence_end).await? {
            EscalationOutcome::Escalated { record, from_level } => Ok(SweepOutcome::Escalated {
                from: from_level,
                to: record.state.level(),
            }),
            EscalationOutcome::AlreadyLocked => Ok(SweepOutcome::Unchanged {
                reason: "already_locked",
            }),
        }
    }
}

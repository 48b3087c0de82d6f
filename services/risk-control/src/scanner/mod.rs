//! Scheduled sweeps over risk control records.

pub mod downgrade;
pub mod escalation;

pub use downgrade::DowngradeScanner;
pub use escalation::{EscalationOutcome, EscalationScanner};

use crate::errors::{RiskControlError, RiskResult};
use crate::metrics::SWEEP_RESULTS_TOTAL;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SweepOutcome {
    Downgraded { from: i16, to: i16 },
    Escalated { from: i16, to: i16 },
    Unchanged { reason: &'static str },
    /// The record changed while the sweep was deciding; the next run reconsiders it.
    Conflict,
    Failed { error: String },
}

impl SweepOutcome {
    fn label(&self) -> &'static str {
        match self {
            SweepOutcome::Downgraded { .. } => "downgraded",
            SweepOutcome::Escalated { .. } => "escalated",
            SweepOutcome::Unchanged { .. } => "unchanged",
            SweepOutcome::Conflict => "conflict",
            SweepOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepItem {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanner: &'static str,
    pub started_at: DateTime<Utc>,
    pub results: Vec<SweepItem>,
}

impl SweepReport {
    pub fn new(scanner: &'static str, started_at: DateTime<Utc>) -> Self {
        SweepReport {
            scanner,
            started_at,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, user_id: String, outcome: SweepOutcome) {
        SWEEP_RESULTS_TOTAL
            .with_label_values(&[self.scanner, outcome.label()])
            .inc();
        self.results.push(SweepItem { user_id, outcome });
    }

    pub fn count(&self, label: &str) -> usize {
        self.results
            .iter()
            .filter(|item| item.outcome.label() == label)
            .count()
    }

    pub fn outcome_for(&self, user_id: &str) -> Option<&SweepOutcome> {
        self.results
            .iter()
            .find(|item| item.user_id == user_id)
            .map(|item| &item.outcome)
    }
}

/// Keeps a scanner to one active run per process.
pub struct SweepLock {
    scanner: &'static str,
    running: AtomicBool,
}

impl SweepLock {
    pub fn new(scanner: &'static str) -> Self {
        SweepLock {
            scanner,
            running: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> RiskResult<SweepLockGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RiskControlError::SweepInProgress(self.scanner))?;
        Ok(SweepLockGuard { lock: self })
    }
}

pub struct SweepLockGuard<'a> {
    lock: &'a SweepLock,
}

impl Drop for SweepLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}

//! Restriction policy: release timers, lookback windows and escalation thresholds.

use crate::models::TimedLevel;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What happens to the release timer when a level-2 restriction steps down to level 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeTimer {
    /// Issue `now + level-1 release`, capped at the previous timer.
    Refresh,
    /// Keep the previous (possibly expired) timer.
    Preserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub level1_release_hours: i64,
    pub level2_release_hours: i64,
    pub level1_lookback_days: i64,
    pub level2_lookback_days: i64,
    pub level3_lookback_days: i64,
    pub downgrade_timer: DowngradeTimer,
    pub escalation: EscalationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Days of evidence considered by a sweep, ending yesterday.
    pub window_days: i64,
    /// Summed suspicious-activity count that raises the level by one.
    pub suspicious_threshold: i64,
    /// Summed count that jumps straight to level 3.
    pub severe_threshold: i64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy {
            level1_release_hours: 24,
            level2_release_hours: 72,
            level1_lookback_days: 3,
            level2_lookback_days: 7,
            level3_lookback_days: 14,
            downgrade_timer: DowngradeTimer::Refresh,
            escalation: EscalationPolicy::default(),
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        EscalationPolicy {
            window_days: 1,
            suspicious_threshold: 3,
            severe_threshold: 20,
        }
    }
}

impl RiskPolicy {
    pub fn release_after(&self, level: TimedLevel) -> Duration {
        match level {
            TimedLevel::Mild => Duration::hours(self.level1_release_hours),
            TimedLevel::Elevated => Duration::hours(self.level2_release_hours),
        }
    }

    /// Clean days required before a restriction at `level` steps down.
    pub fn lookback_days(&self, level: i16) -> i64 {
        match level {
            l if l >= 3 => self.level3_lookback_days,
            2 => self.level2_lookback_days,
            _ => self.level1_lookback_days,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.level1_release_hours <= 0 || self.level2_release_hours <= 0 {
            return Err("release hours must be positive".to_string());
        }
        if self.level1_lookback_days <= 0
            || self.level2_lookback_days <= 0
            || self.level3_lookback_days <= 0
        {
            return Err("lookback days must be positive".to_string());
        }
        if self.escalation.window_days <= 0 {
            return Err("escalation window must be at least one day".to_string());
        }
        if self.escalation.suspicious_threshold <= 0 {
            return Err("suspicious threshold must be positive".to_string());
        }
        if self.escalation.severe_threshold < self.escalation.suspicious_threshold {
            return Err("severe threshold must not be below the suspicious threshold".to_string());
        }
        Ok(())
    }
}

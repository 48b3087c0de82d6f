use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Highest restriction level. Only a manual unlock clears it.
pub const MAX_LEVEL: i16 = 3;

// ===== Risk Control State =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Normal,
    Restricted,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Normal => "normal",
            RiskStatus::Restricted => "restricted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(RiskStatus::Normal),
            "restricted" => Some(RiskStatus::Restricted),
            _ => None,
        }
    }
}

/// Restriction levels that carry an automatic release timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimedLevel {
    Mild,     // level 1
    Elevated, // level 2
}

impl TimedLevel {
    pub fn level(self) -> i16 {
        match self {
            TimedLevel::Mild => 1,
            TimedLevel::Elevated => 2,
        }
    }
}

/// An active restriction. Level 3 is `Locked` and has no timer to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    Timed {
        level: TimedLevel,
        /// `None` only for legacy rows written without a timer; such rows never
        /// auto-release and wait for the downgrade sweep.
        auto_release_at: Option<DateTime<Utc>>,
    },
    Locked,
}

impl Restriction {
    /// Maps a stored level onto a restriction, clamping out-of-range values.
    pub fn from_level(level: i16, auto_release_at: Option<DateTime<Utc>>) -> Self {
        match level {
            l if l >= MAX_LEVEL => Restriction::Locked,
            2 => Restriction::Timed {
                level: TimedLevel::Elevated,
                auto_release_at,
            },
            _ => Restriction::Timed {
                level: TimedLevel::Mild,
                auto_release_at,
            },
        }
    }

    pub fn level(&self) -> i16 {
        match self {
            Restriction::Timed { level, .. } => level.level(),
            Restriction::Locked => MAX_LEVEL,
        }
    }

    pub fn auto_release_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Restriction::Timed {
                auto_release_at, ..
            } => *auto_release_at,
            Restriction::Locked => None,
        }
    }
}

/// Per-user risk state. `Normal` keeps the last level as history so the next
/// escalation continues from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskState {
    Normal { level: i16 },
    Restricted(Restriction),
}

impl RiskState {
    /// State of a user without any record.
    pub const CLEAN: RiskState = RiskState::Normal { level: 0 };

    pub fn status(&self) -> RiskStatus {
        match self {
            RiskState::Normal { .. } => RiskStatus::Normal,
            RiskState::Restricted(_) => RiskStatus::Restricted,
        }
    }

    pub fn level(&self) -> i16 {
        match self {
            RiskState::Normal { level } => *level,
            RiskState::Restricted(restriction) => restriction.level(),
        }
    }

    pub fn auto_release_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RiskState::Normal { .. } => None,
            RiskState::Restricted(restriction) => restriction.auto_release_at(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, RiskState::Restricted(_))
    }
}

// ===== Risk Control Record =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskControlRecord {
    pub user_id: String,
    pub state: RiskState,
    /// Last mutation time, also used as the compare-and-set token.
    pub updated_at: DateTime<Utc>,
    /// Last activity day already turned into an escalation. Later days are new evidence.
    pub evidence_through: Option<NaiveDate>,
}

impl RiskControlRecord {
    pub fn new(user_id: impl Into<String>, state: RiskState, now: DateTime<Utc>) -> Self {
        RiskControlRecord {
            user_id: user_id.into(),
            state,
            updated_at: revision_after(None, now),
            evidence_through: None,
        }
    }

    /// Next version of this record carrying `state`. The evidence watermark is kept.
    pub fn transition(&self, state: RiskState, now: DateTime<Utc>) -> Self {
        RiskControlRecord {
            user_id: self.user_id.clone(),
            state,
            updated_at: revision_after(Some(self.updated_at), now),
            evidence_through: self.evidence_through,
        }
    }

    /// Moves the evidence watermark forward to `day`. Never moves it back.
    pub fn with_evidence_through(mut self, day: NaiveDate) -> Self {
        self.evidence_through = Some(self.evidence_through.map_or(day, |seen| seen.max(day)));
        self
    }

    /// First activity day not yet used by an escalation.
    pub fn first_unapplied_day(&self) -> Option<NaiveDate> {
        self.evidence_through.and_then(|day| day.succ_opt())
    }
}

/// Produces an `updated_at` at microsecond precision (what Postgres stores) that
/// is strictly greater than `previous`.
pub fn revision_after(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

// ===== Persistence Row =====

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RiskControlRow {
    pub user_id: String,
    pub status: String,
    pub level: i16,
    pub auto_release_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub evidence_through: Option<NaiveDate>,
}

impl From<&RiskControlRecord> for RiskControlRow {
    fn from(record: &RiskControlRecord) -> Self {
        RiskControlRow {
            user_id: record.user_id.clone(),
            status: record.state.status().as_str().to_string(),
            level: record.state.level(),
            auto_release_at: record.state.auto_release_at(),
            updated_at: record.updated_at,
            evidence_through: record.evidence_through,
        }
    }
}

impl From<RiskControlRow> for RiskControlRecord {
    fn from(row: RiskControlRow) -> Self {
        let state = match RiskStatus::parse(&row.status) {
            Some(RiskStatus::Normal) => RiskState::Normal {
                level: row.level.clamp(0, MAX_LEVEL),
            },
            Some(RiskStatus::Restricted) => {
                RiskState::Restricted(Restriction::from_level(row.level, row.auto_release_at))
            }
            None => {
                tracing::warn!(
                    user_id = %row.user_id,
                    status = %row.status,
                    "Unknown risk status in store, treating as restricted"
                );
                RiskState::Restricted(Restriction::from_level(row.level, row.auto_release_at))
            }
        };

        RiskControlRecord {
            user_id: row.user_id,
            state,
            updated_at: row.updated_at,
            evidence_through: row.evidence_through,
        }
    }
}

// ===== Evaluator Decision =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenialReason {
    #[serde(rename = "restricted")]
    Restricted,
    #[serde(rename = "restricted_level_3")]
    RestrictedLevel3,
}

impl DenialReason {
    /// Error code returned by the payment route for this denial.
    pub fn payment_error_code(&self) -> &'static str {
        match self {
            DenialReason::Restricted => "payment_temporarily_restricted",
            DenialReason::RestrictedLevel3 => "restricted_level_3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    pub level: i16,
    pub auto_release_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Allowed,
    Denied(Denial),
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allowed)
    }
}

// ===== API Requests =====

/// Body of routes addressing a single user.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    /// Jump straight to level 3.
    #[serde(default)]
    pub severe: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorizationRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_positive() && !amount.is_zero() {
        Ok(())
    } else {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("amount must be greater than zero".into());
        Err(err)
    }
}

// ===== API Responses =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_release_at: Option<DateTime<Utc>>,
}

impl From<RiskDecision> for RiskCheckResponse {
    fn from(decision: RiskDecision) -> Self {
        match decision {
            RiskDecision::Allowed => RiskCheckResponse {
                allowed: true,
                reason: None,
                level: None,
                auto_release_at: None,
            },
            RiskDecision::Denied(denial) => RiskCheckResponse {
                allowed: false,
                reason: Some(denial.reason),
                level: Some(denial.level),
                auto_release_at: denial.auto_release_at,
            },
        }
    }
}

/// Body of a 403 from the payment route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRestrictedResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_release_at: Option<DateTime<Utc>>,
    pub level: i16,
}

impl From<&Denial> for PaymentRestrictedResponse {
    fn from(denial: &Denial) -> Self {
        PaymentRestrictedResponse {
            error: denial.reason.payment_error_code(),
            auto_release_at: denial.auto_release_at,
            level: denial.level,
        }
    }
}

/// Public view of a stored record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRecordView {
    pub user_id: String,
    pub status: RiskStatus,
    pub level: i16,
    pub auto_release_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&RiskControlRecord> for RiskRecordView {
    fn from(record: &RiskControlRecord) -> Self {
        RiskRecordView {
            user_id: record.user_id.clone(),
            status: record.state.status(),
            level: record.state.level(),
            auto_release_at: record.state.auto_release_at(),
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn row(status: &str, level: i16, auto_release_at: Option<DateTime<Utc>>) -> RiskControlRow {
        RiskControlRow {
            user_id: "user-1".to_string(),
            status: status.to_string(),
            level,
            auto_release_at,
            updated_at: ts(0),
            evidence_through: None,
        }
    }

    #[test]
    fn test_level_three_row_drops_timer() {
        let record = RiskControlRecord::from(row("restricted", 3, Some(ts(5))));
        assert_eq!(record.state, RiskState::Restricted(Restriction::Locked));
        assert_eq!(record.state.auto_release_at(), None);
    }

    #[test]
    fn test_restricted_rows_clamp_level() {
        let low = RiskControlRecord::from(row("restricted", 0, Some(ts(5))));
        assert_eq!(low.state.level(), 1);

        let high = RiskControlRecord::from(row("restricted", 9, None));
        assert_eq!(high.state, RiskState::Restricted(Restriction::Locked));

        let normal = RiskControlRecord::from(row("normal", 7, Some(ts(5))));
        assert_eq!(normal.state, RiskState::Normal { level: 3 });
    }

    #[test]
    fn test_unknown_status_is_restricted() {
        let record = RiskControlRecord::from(row("frozen", 2, Some(ts(5))));
        assert!(record.state.is_restricted());
        assert_eq!(record.state.level(), 2);
    }

    #[test]
    fn test_row_from_record() {
        let record = RiskControlRecord::new(
            "user-1",
            RiskState::Restricted(Restriction::Timed {
                level: TimedLevel::Elevated,
                auto_release_at: Some(ts(9)),
            }),
            ts(1),
        );
        let row = RiskControlRow::from(&record);
        assert_eq!(row.status, "restricted");
        assert_eq!(row.level, 2);
        assert_eq!(row.auto_release_at, Some(ts(9)));
    }

    #[test]
    fn test_evidence_watermark_survives_transitions_and_only_moves_forward() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
        let record = RiskControlRecord::new("user-1", RiskState::CLEAN, ts(1));
        assert_eq!(record.first_unapplied_day(), None);

        let escalated = record
            .transition(RiskState::Restricted(Restriction::Locked), ts(2))
            .with_evidence_through(day(5));
        let released = escalated.transition(RiskState::Normal { level: 1 }, ts(3));
        assert_eq!(released.evidence_through, Some(day(5)));
        assert_eq!(released.first_unapplied_day(), Some(day(6)));

        let rewound = released.with_evidence_through(day(2));
        assert_eq!(rewound.evidence_through, Some(day(5)));
        assert_eq!(RiskControlRow::from(&rewound).evidence_through, Some(day(5)));
    }

    #[test]
    fn test_revision_is_strictly_increasing() {
        let first = revision_after(None, ts(1));
        assert_eq!(revision_after(Some(first), ts(1)), first + Duration::microseconds(1));
        assert_eq!(revision_after(Some(first), ts(2)), ts(2));

        let with_nanos = ts(1) + Duration::nanoseconds(1_500);
        assert_eq!(revision_after(None, with_nanos), ts(1) + Duration::microseconds(1));
    }

    #[test]
    fn test_denial_reason_codes() {
        assert_eq!(
            serde_json::to_value(DenialReason::RestrictedLevel3).unwrap(),
            serde_json::json!("restricted_level_3")
        );
        assert_eq!(
            DenialReason::Restricted.payment_error_code(),
            "payment_temporarily_restricted"
        );
    }

    #[test]
    fn test_payment_request_validation() {
        let valid: PaymentAuthorizationRequest = serde_json::from_value(serde_json::json!({
            "userId": "user-1",
            "amount": "19.99",
            "token": "tok_visa"
        }))
        .unwrap();
        assert!(valid.validate().is_ok());

        let zero: PaymentAuthorizationRequest = serde_json::from_value(serde_json::json!({
            "userId": "user-1",
            "amount": "0",
            "token": "tok_visa"
        }))
        .unwrap();
        assert!(zero.validate().is_err());

        let missing: UserRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(missing.validate().is_err());
    }
}

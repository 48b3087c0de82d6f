//! Pure transition rules of the restriction state machine.
//!
//! Nothing here touches storage. Callers read a record, ask for the next state and
//! write it back with a compare-and-set.

use crate::models::{Denial, DenialReason, Restriction, RiskState, TimedLevel, MAX_LEVEL};
use crate::policy::{DowngradeTimer, RiskPolicy};
use chrono::{DateTime, Utc};

/// Outcome of inspecting a state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Timer has elapsed: allow, after persisting the released state.
    Release(RiskState),
    Deny(Denial),
}

pub fn judge(state: &RiskState, now: DateTime<Utc>) -> Verdict {
    match state {
        RiskState::Normal { .. } => Verdict::Allow,
        RiskState::Restricted(Restriction::Locked) => Verdict::Deny(Denial {
            reason: DenialReason::RestrictedLevel3,
            level: MAX_LEVEL,
            auto_release_at: None,
        }),
        RiskState::Restricted(Restriction::Timed {
            level,
            auto_release_at,
        }) => match auto_release_at {
            Some(at) if *at <= now => Verdict::Release(RiskState::Normal {
                level: level.level(),
            }),
            _ => Verdict::Deny(Denial {
                reason: DenialReason::Restricted,
                level: level.level(),
                auto_release_at: *auto_release_at,
            }),
        },
    }
}

/// Restriction imposed when entering `level` at `now`.
pub fn restriction_at(level: i16, policy: &RiskPolicy, now: DateTime<Utc>) -> RiskState {
    let restriction = match level {
        l if l >= MAX_LEVEL => Restriction::Locked,
        2 => timed(TimedLevel::Elevated, policy, now),
        _ => timed(TimedLevel::Mild, policy, now),
    };
    RiskState::Restricted(restriction)
}

fn timed(level: TimedLevel, policy: &RiskPolicy, now: DateTime<Utc>) -> Restriction {
    Restriction::Timed {
        level,
        auto_release_at: Some(now + policy.release_after(level)),
    }
}

/// One notch down, or `None` when the state is not restricted.
pub fn step_down(state: &RiskState, policy: &RiskPolicy, now: DateTime<Utc>) -> Option<RiskState> {
    let RiskState::Restricted(restriction) = state else {
        return None;
    };

    let next = match restriction {
        Restriction::Timed {
            level: TimedLevel::Mild,
            ..
        } => RiskState::Normal { level: 0 },
        Restriction::Timed {
            level: TimedLevel::Elevated,
            auto_release_at,
        } => match (policy.downgrade_timer, auto_release_at) {
            (DowngradeTimer::Preserve, Some(previous)) => {
                RiskState::Restricted(Restriction::Timed {
                    level: TimedLevel::Mild,
                    auto_release_at: Some(*previous),
                })
            }
            (DowngradeTimer::Refresh, Some(previous)) => {
                let fresh = now + policy.release_after(TimedLevel::Mild);
                RiskState::Restricted(Restriction::Timed {
                    level: TimedLevel::Mild,
                    auto_release_at: Some(fresh.min(*previous)),
                })
            }
            _ => RiskState::Restricted(timed(TimedLevel::Mild, policy, now)),
        },
        Restriction::Locked => RiskState::Restricted(timed(TimedLevel::Elevated, policy, now)),
    };

    Some(next)
}

/// One notch up (or straight to level 3 when `severe`), or `None` when already locked.
pub fn step_up(
    state: &RiskState,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
    severe: bool,
) -> Option<RiskState> {
    if matches!(state, RiskState::Restricted(Restriction::Locked)) {
        return None;
    }

    let target = if severe {
        MAX_LEVEL
    } else {
        (state.level().max(0) + 1).min(MAX_LEVEL)
    };

    Some(restriction_at(target, policy, now))
}

/// State written by a manual unlock.
pub fn unlocked() -> RiskState {
    RiskState::Normal { level: 1 }
}

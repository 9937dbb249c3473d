//! Admission decision for one award against a cap window.
//!
//! Pure: the caller supplies the window, the resolved limits and `now`.

use chrono::{DateTime, NaiveDate, Utc};
use prime_bank_proto::{CapWindow, CapWindowKind};

use crate::cap_policy::CapLimits;

/// New window state to store when the award is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapAdmission {
    pub new_daily_total: u64,
    pub new_weekly_total: u64,
    pub new_daily_reset: NaiveDate,
    pub new_weekly_reset: NaiveDate,
    pub daily_rolled_over: bool,
    pub weekly_rolled_over: bool,
}

impl CapAdmission {
    pub fn apply_to(&self, window: &mut CapWindow) {
        window.daily_total = self.new_daily_total;
        window.weekly_total = self.new_weekly_total;
        window.last_daily_reset = self.new_daily_reset;
        window.last_weekly_reset = self.new_weekly_reset;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapRejection {
    pub window: CapWindowKind,
    pub reason: String,
    /// In credited units.
    pub suggested_max_award: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapDecision {
    Admitted(CapAdmission),
    Rejected(CapRejection),
}

impl CapDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, CapDecision::Admitted(_))
    }
}

pub fn evaluate(
    window: &CapWindow,
    limits: &CapLimits,
    now: DateTime<Utc>,
    amount: u64,
) -> CapDecision {
    let daily_rolled_over = window.daily_is_stale(now);
    let weekly_rolled_over = window.weekly_is_stale(now);
    let (effective_daily, effective_weekly) = window.effective_totals(now);

    let (new_daily_reset, new_weekly_reset) = window.next_markers(now);

    let next_daily = effective_daily.saturating_add(amount);
    let next_weekly = effective_weekly.saturating_add(amount);
    let daily_ok = next_daily <= limits.daily_cap;
    let weekly_ok = next_weekly <= limits.weekly_cap;

    if daily_ok && weekly_ok {
        return CapDecision::Admitted(CapAdmission {
            new_daily_total: next_daily,
            new_weekly_total: next_weekly,
            new_daily_reset,
            new_weekly_reset,
            daily_rolled_over,
            weekly_rolled_over,
        });
    }

    let daily_room = limits.daily_cap.saturating_sub(effective_daily);
    let weekly_room = limits.weekly_cap.saturating_sub(effective_weekly);
    let (binding, cap, effective) = if daily_ok {
        (CapWindowKind::Weekly, limits.weekly_cap, effective_weekly)
    } else {
        (CapWindowKind::Daily, limits.daily_cap, effective_daily)
    };
    CapDecision::Rejected(CapRejection {
        window: binding,
        reason: format!(
            "{binding} total {effective} plus {amount} exceeds {binding} cap {cap}"
        ),
        suggested_max_award: daily_room.min(weekly_room),
    })
}

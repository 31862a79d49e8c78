//! Daily API quota state and budget allocation

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Persisted quota counter for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub date: NaiveDate,
    pub calls_made: u32,
    pub daily_limit: u32,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    pub const fn fresh(date: NaiveDate, daily_limit: u32) -> Self {
        Self {
            date,
            calls_made: 0,
            daily_limit,
            last_call_at: None,
        }
    }

    pub const fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.calls_made)
    }

    pub const fn has_quota(&self) -> bool {
        self.calls_made < self.daily_limit
    }

    /// Replace the state when `today` differs from the stored date.
    /// Returns true when a rollover happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.date == today {
            return false;
        }
        *self = Self::fresh(today, self.daily_limit);
        true
    }
}

/// Snapshot of the quota for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub date: NaiveDate,
    pub calls_made: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl From<&QuotaState> for QuotaStatus {
    fn from(state: &QuotaState) -> Self {
        Self {
            date: state.date,
            calls_made: state.calls_made,
            daily_limit: state.daily_limit,
            remaining: state.remaining(),
            last_call_at: state.last_call_at,
        }
    }
}

/// Tunables for spreading the remaining quota over the week
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    /// Below this many remaining calls the formula is bypassed
    pub low_water_mark: u32,
    /// Per-run cap once below the low water mark
    pub low_water_cap: u32,
    /// Minimum daily budget from the formula
    pub daily_floor: u32,
    /// Share of the remaining quota that may be spent, in percent
    pub usable_percent: u32,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            low_water_mark: 100,
            low_water_cap: 20,
            daily_floor: 50,
            usable_percent: 90,
        }
    }
}

/// Days left until the weekly reset. The week starts on Sunday, so Sunday
/// counts as a full 7 days and Saturday as 1.
pub fn days_until_weekly_reset(weekday: Weekday) -> u32 {
    7 - weekday.num_days_from_sunday()
}

/// How many calls a single run may spend today.
pub fn daily_budget(remaining: u32, days_until_reset: u32, policy: &BudgetPolicy) -> u32 {
    if remaining < policy.low_water_mark {
        return remaining.min(policy.low_water_cap);
    }

    let days = u64::from(days_until_reset.max(1));
    let usable = u64::from(remaining) * u64::from(policy.usable_percent) / 100;
    let per_day = u32::try_from(usable / days).unwrap_or(u32::MAX);
    per_day.max(policy.daily_floor).min(remaining)
}

use reqfix_types::requirement::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortUnit {
    Hours,
    Days,
    Weeks,
}

/// Effort rounded up to whole hours, plus the bucketed amount shown to people.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortEstimate {
    pub hours: u64,
    pub amount: u64,
    pub unit: EffortUnit,
}

impl fmt::Display for EffortEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match (self.unit, self.amount == 1) {
            (EffortUnit::Hours, true) => "hour",
            (EffortUnit::Hours, false) => "hours",
            (EffortUnit::Days, true) => "day",
            (EffortUnit::Days, false) => "days",
            (EffortUnit::Weeks, true) => "week",
            (EffortUnit::Weeks, false) => "weeks",
        };
        write!(f, "{} {}", self.amount, unit)
    }
}

pub fn base_effort_hours(priority: Priority) -> u64 {
    match priority {
        Priority::Critical => 16,
        Priority::High => 8,
        Priority::Medium => 4,
        Priority::Low => 2,
    }
}

/// `ceil(base * (1 + 0.2 * affected))`, computed as `ceil(base * (5 + affected) / 5)` so the
/// rounding is exact, then bucketed: up to 4h in hours, up to 24h in 8h days, else 40h weeks.
pub fn estimate_effort(priority: Priority, affected: usize) -> EffortEstimate {
    let base = base_effort_hours(priority);
    let hours = (base * (5 + affected as u64)).div_ceil(5);
    let (amount, unit) = if hours <= 4 {
        (hours, EffortUnit::Hours)
    } else if hours <= 24 {
        (hours.div_ceil(8), EffortUnit::Days)
    } else {
        (hours.div_ceil(40), EffortUnit::Weeks)
    };
    EffortEstimate {
        hours,
        amount,
        unit,
    }
}

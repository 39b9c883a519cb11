use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A completed (or still open) check-in handed over by the attendance module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceInterval {
    pub employee_id: u64,
    pub branch_id: u64,
    pub check_in_at: NaiveDateTime,
    pub check_out_at: Option<NaiveDateTime>,
}

impl AttendanceInterval {
    /// Worked hours, or zero when the checkout is missing or not after the check-in.
    pub fn worked_hours(&self) -> f64 {
        match self.check_out_at {
            Some(out) if out > self.check_in_at => {
                (out - self.check_in_at).num_seconds() as f64 / 3600.0
            }
            _ => 0.0,
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self.check_out_at, Some(out) if out > self.check_in_at)
    }
}

/// Per-employee pay rates as held on the employee record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayRates {
    pub hourly_rate: f64,
    pub daily_rate: f64,
}

impl PayRates {
    pub fn is_usable(&self) -> bool {
        self.hourly_rate.is_finite()
            && self.daily_rate.is_finite()
            && self.hourly_rate >= 0.0
            && self.daily_rate >= 0.0
    }
}

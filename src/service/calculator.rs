use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceInterval, PayRates};
use crate::model::payroll_cycle::PayrollCycle;
use crate::model::payroll_detail::round_money;

/// Threshold above which an interval is paid the flat daily rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateRule {
    pub daily_threshold_hours: f64,
}

impl Default for RateRule {
    fn default() -> Self {
        Self {
            daily_threshold_hours: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RateApplied {
    Hourly,
    Daily,
    /// Missing or invalid checkout.
    Unpaid,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct IntervalPay {
    pub branch_id: u64,
    pub check_in_at: NaiveDateTime,
    pub check_out_at: Option<NaiveDateTime>,
    pub hours: f64,
    pub rate_applied: RateApplied,
    pub pay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BasePay {
    pub employee_id: u64,
    pub base_pay: f64,
    pub breakdown: Vec<IntervalPay>,
}

/// Pay for one interval, rounded to cents.
///
/// Exactly `daily_threshold_hours` is still paid hourly.
pub fn interval_pay(interval: &AttendanceInterval, rates: PayRates, rule: RateRule) -> IntervalPay {
    let hours = interval.worked_hours();

    let (rate_applied, pay) = if !interval.is_payable() {
        (RateApplied::Unpaid, 0.0)
    } else if hours > rule.daily_threshold_hours {
        (RateApplied::Daily, round_money(rates.daily_rate))
    } else {
        (RateApplied::Hourly, round_money(hours * rates.hourly_rate))
    };

    IntervalPay {
        branch_id: interval.branch_id,
        check_in_at: interval.check_in_at,
        check_out_at: interval.check_out_at,
        hours: round_money(hours),
        rate_applied,
        pay,
    }
}

/// Whether an interval touches the cycle's inclusive date range.
pub fn overlaps_cycle(interval: &AttendanceInterval, cycle: &PayrollCycle) -> bool {
    let last = interval
        .check_out_at
        .filter(|out| *out > interval.check_in_at)
        .unwrap_or(interval.check_in_at);
    interval.check_in_at.date() <= cycle.period_end && last.date() >= cycle.period_start
}

/// Base pay for one employee over one cycle.
///
/// Pure: the same intervals, rates and rule always give the same amount.
pub fn calculate_base_pay(
    employee_id: u64,
    cycle: &PayrollCycle,
    intervals: &[AttendanceInterval],
    rates: PayRates,
    rule: RateRule,
) -> BasePay {
    let breakdown: Vec<IntervalPay> = intervals
        .iter()
        .filter(|i| i.employee_id == employee_id && overlaps_cycle(i, cycle))
        .map(|i| interval_pay(i, rates, rule))
        .collect();

    let base_pay = round_money(breakdown.iter().map(|p| p.pay).sum());

    BasePay {
        employee_id,
        base_pay,
        breakdown,
    }
}

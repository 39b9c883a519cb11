use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Rounds a money amount to cents.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 31,
    "payroll_cycle_id": 7,
    "employee_id": 1001,
    "base_pay": 30000.0,
    "overtime_hours": 20.0,
    "overtime_rate": 250.0,
    "overtime_pay": 5000.0,
    "bonus": 2000.0,
    "bonus_reason": "Quarterly target met",
    "deduction": 1500.0,
    "deduction_reason": "Equipment damage",
    "net_pay": 35500.0,
    "created_at": "2026-02-01T09:00:00Z"
}))]
pub struct PayrollDetail {
    pub id: u64,
    pub payroll_cycle_id: u64,
    pub employee_id: u64,
    pub base_pay: f64,
    pub overtime_hours: f64,
    pub overtime_rate: f64,
    pub overtime_pay: f64,
    pub bonus: f64,
    pub bonus_reason: Option<String>,
    pub deduction: f64,
    pub deduction_reason: Option<String>,
    pub net_pay: f64,
    pub created_at: DateTime<Utc>,
}

/// A single write against the adjustable fields of a detail.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    Bonus { amount: f64, reason: Option<String> },
    Deduction { amount: f64, reason: Option<String> },
    Overtime { hours: f64, rate: f64 },
}

impl PayrollDetail {
    /// A fresh detail for an employee that has no row in the cycle yet.
    pub fn new(payroll_cycle_id: u64, employee_id: u64, base_pay: f64, created_at: DateTime<Utc>) -> Self {
        let mut detail = Self {
            id: 0,
            payroll_cycle_id,
            employee_id,
            base_pay,
            overtime_hours: 0.0,
            overtime_rate: 0.0,
            overtime_pay: 0.0,
            bonus: 0.0,
            bonus_reason: None,
            deduction: 0.0,
            deduction_reason: None,
            net_pay: 0.0,
            created_at,
        };
        detail.recompute();
        detail
    }

    /// Refreshes the derived fields. Every write goes through here.
    pub fn recompute(&mut self) {
        self.overtime_pay = round_money(self.overtime_hours * self.overtime_rate);
        self.net_pay = round_money(self.base_pay + self.overtime_pay + self.bonus - self.deduction);
    }

    /// Replaces base pay only; overtime, bonus and deduction survive recalculation.
    pub fn with_base_pay(&self, base_pay: f64) -> Self {
        let mut next = self.clone();
        next.base_pay = base_pay;
        next.recompute();
        next
    }

    pub fn adjusted(&self, adjustment: &Adjustment) -> Self {
        let mut next = self.clone();
        match adjustment {
            Adjustment::Bonus { amount, reason } => {
                next.bonus = *amount;
                next.bonus_reason = if *amount > 0.0 { reason.clone() } else { None };
            }
            Adjustment::Deduction { amount, reason } => {
                next.deduction = *amount;
                next.deduction_reason = if *amount > 0.0 { reason.clone() } else { None };
            }
            Adjustment::Overtime { hours, rate } => {
                next.overtime_hours = *hours;
                next.overtime_rate = *rate;
            }
        }
        next.recompute();
        next
    }
}

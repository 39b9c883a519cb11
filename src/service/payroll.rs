use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::PayrollError;
use crate::model::attendance::AttendanceInterval;
use crate::model::audit_log::{AuditAction, PAYROLL_CYCLES, PAYROLL_DETAILS};
use crate::model::payroll_cycle::{NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::{PayrollDetail, round_money};
use crate::service::audit::{AuditContext, AuditTrail};
use crate::service::calculator::{IntervalPay, RateRule, calculate_base_pay, overlaps_cycle};
use crate::store::{AttendanceSource, PayrollStore};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmployeeCalculation {
    pub employee_id: u64,
    pub detail_id: u64,
    pub previous_base_pay: Option<f64>,
    pub base_pay: f64,
    pub net_pay: f64,
    pub intervals: Vec<IntervalPay>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SkippedEmployee {
    pub employee_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CalculationReport {
    pub cycle_id: u64,
    pub calculated_at: DateTime<Utc>,
    pub employees: Vec<EmployeeCalculation>,
    pub skipped: Vec<SkippedEmployee>,
    pub total_base_pay: f64,
}

/// Attendance that touches the cycle, grouped per employee.
pub(crate) async fn cycle_attendance(
    source: &dyn AttendanceSource,
    cycle: &PayrollCycle,
) -> Result<BTreeMap<u64, Vec<AttendanceInterval>>, PayrollError> {
    let intervals = source
        .intervals_between(cycle.period_start, cycle.period_end)
        .await?;

    let mut by_employee: BTreeMap<u64, Vec<AttendanceInterval>> = BTreeMap::new();
    for interval in intervals.into_iter().filter(|i| overlaps_cycle(i, cycle)) {
        by_employee.entry(interval.employee_id).or_default().push(interval);
    }
    Ok(by_employee)
}

/// Cycle bookkeeping and base-pay recalculation.
#[derive(Clone)]
pub struct PayrollService {
    store: Arc<dyn PayrollStore>,
    attendance: Arc<dyn AttendanceSource>,
    audit: AuditTrail,
    rule: RateRule,
}

impl PayrollService {
    pub fn new(
        store: Arc<dyn PayrollStore>,
        attendance: Arc<dyn AttendanceSource>,
        audit: AuditTrail,
        rule: RateRule,
    ) -> Self {
        Self {
            store,
            attendance,
            audit,
            rule,
        }
    }

    pub async fn create_cycle(
        &self,
        cycle: &NewPayrollCycle,
        ctx: &AuditContext,
    ) -> Result<PayrollCycle, PayrollError> {
        let errors = cycle.validate();
        if !errors.is_empty() {
            return Err(PayrollError::validation(errors));
        }

        let created = self.store.create_cycle(cycle, Utc::now()).await?;
        tracing::info!(cycle_id = created.id, name = %created.name, "Payroll cycle created");

        self.audit
            .record(ctx.entry(
                AuditAction::Create,
                PAYROLL_CYCLES,
                created.id,
                None,
                serde_json::to_value(&created).ok(),
                format!(
                    "Created payroll cycle '{}' ({} to {})",
                    created.name, created.period_start, created.period_end
                ),
            ))
            .await;

        Ok(created)
    }

    pub async fn get_cycle(&self, cycle_id: u64) -> Result<PayrollCycle, PayrollError> {
        self.store
            .get_cycle(cycle_id)
            .await?
            .ok_or_else(|| PayrollError::cycle_not_found(cycle_id))
    }

    pub async fn list_cycles(&self) -> Result<Vec<PayrollCycle>, PayrollError> {
        self.store.list_cycles().await
    }

    pub async fn list_details(&self, cycle_id: u64) -> Result<Vec<PayrollDetail>, PayrollError> {
        self.get_cycle(cycle_id).await?;
        self.store.list_details(cycle_id).await
    }

    pub async fn get_detail(&self, detail_id: u64) -> Result<PayrollDetail, PayrollError> {
        self.store
            .get_detail(detail_id)
            .await?
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))
    }

    pub async fn delete_detail(&self, detail_id: u64, ctx: &AuditContext) -> Result<PayrollDetail, PayrollError> {
        let deleted = self.store.delete_detail(detail_id).await?;
        tracing::info!(
            detail_id,
            cycle_id = deleted.payroll_cycle_id,
            employee_id = deleted.employee_id,
            "Payroll detail deleted"
        );

        self.audit
            .record(ctx.entry(
                AuditAction::Delete,
                PAYROLL_DETAILS,
                detail_id,
                serde_json::to_value(&deleted).ok(),
                None,
                format!(
                    "Deleted payroll detail for employee #{} in cycle #{} (net pay {:.2})",
                    deleted.employee_id, deleted.payroll_cycle_id, deleted.net_pay
                ),
            ))
            .await;

        Ok(deleted)
    }

    /// Recomputes base pay for everyone with attendance in the cycle.
    ///
    /// Safe to repeat while the cycle is active; bonus, deduction and overtime are kept.
    pub async fn calculate(&self, cycle_id: u64, ctx: &AuditContext) -> Result<CalculationReport, PayrollError> {
        let cycle = self.get_cycle(cycle_id).await?;
        if cycle.is_locked() {
            return Err(PayrollError::CycleLocked(cycle_id));
        }

        let attendance = cycle_attendance(self.attendance.as_ref(), &cycle).await?;
        let employee_ids: Vec<u64> = attendance.keys().copied().collect();
        let rates = self.attendance.pay_rates(&employee_ids).await?;

        let calculated_at = Utc::now();
        let mut employees = Vec::with_capacity(attendance.len());
        let mut skipped = Vec::new();
        let mut failure: Option<PayrollError> = None;

        for (employee_id, intervals) in &attendance {
            let employee_rates = match rates.get(employee_id) {
                Some(r) if r.is_usable() => *r,
                Some(_) => {
                    tracing::warn!(cycle_id, employee_id, "Skipping employee with invalid pay rates");
                    skipped.push(SkippedEmployee {
                        employee_id: *employee_id,
                        reason: "pay rates must be finite and non-negative".into(),
                    });
                    continue;
                }
                None => {
                    tracing::warn!(cycle_id, employee_id, "Skipping employee without pay rates");
                    skipped.push(SkippedEmployee {
                        employee_id: *employee_id,
                        reason: "no pay rates on record".into(),
                    });
                    continue;
                }
            };

            let base = calculate_base_pay(*employee_id, &cycle, intervals, employee_rates, self.rule);
            let change = match self
                .store
                .upsert_base_pay(cycle_id, *employee_id, base.base_pay, calculated_at)
                .await
            {
                Ok(change) => change,
                Err(e) => {
                    tracing::error!(cycle_id, employee_id, error = %e, "Base pay write failed, calculation stopped");
                    failure = Some(e);
                    break;
                }
            };

            employees.push(EmployeeCalculation {
                employee_id: *employee_id,
                detail_id: change.after.id,
                previous_base_pay: change.before.map(|d| d.base_pay),
                base_pay: change.after.base_pay,
                net_pay: change.after.net_pay,
                intervals: base.breakdown,
            });
        }

        let total_base_pay = round_money(employees.iter().map(|e| e.base_pay).sum());
        tracing::info!(
            cycle_id,
            calculated = employees.len(),
            skipped = skipped.len(),
            total_base_pay,
            completed = failure.is_none(),
            "Payroll cycle calculated"
        );

        // Rows written before a failure stay committed and are audited as such.
        if failure.is_none() || !employees.is_empty() {
            let previous: Vec<_> = employees
                .iter()
                .filter_map(|e| {
                    e.previous_base_pay
                        .map(|b| json!({"employee_id": e.employee_id, "base_pay": b}))
                })
                .collect();
            let current: Vec<_> = employees
                .iter()
                .map(|e| json!({"employee_id": e.employee_id, "detail_id": e.detail_id, "base_pay": e.base_pay}))
                .collect();
            let skipped_ids: Vec<u64> = skipped.iter().map(|s| s.employee_id).collect();

            let description = match &failure {
                None => format!(
                    "Calculated base pay for {} employee(s) in payroll cycle '{}' (total {:.2})",
                    employees.len(),
                    cycle.name,
                    total_base_pay
                ),
                Some(e) => format!(
                    "Calculation of payroll cycle '{}' stopped after {} employee(s) (total {:.2}): {e}",
                    cycle.name,
                    employees.len(),
                    total_base_pay
                ),
            };

            self.audit
                .record(ctx.entry(
                    AuditAction::Calculate,
                    PAYROLL_CYCLES,
                    cycle_id,
                    (!previous.is_empty()).then(|| json!({ "employees": previous })),
                    Some(json!({
                        "employees": current,
                        "skipped": skipped_ids,
                        "total_base_pay": total_base_pay,
                        "completed": failure.is_none(),
                    })),
                    description,
                ))
                .await;
        }

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(CalculationReport {
            cycle_id,
            calculated_at,
            employees,
            skipped,
            total_base_pay,
        })
    }
}

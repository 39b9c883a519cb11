use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::error::PayrollError;
use crate::model::audit_log::{AuditAction, PAYROLL_CYCLES};
use crate::model::payroll_cycle::PayrollCycle;
use crate::model::payroll_detail::{PayrollDetail, round_money};
use crate::service::audit::{AuditContext, AuditTrail};
use crate::service::payroll::cycle_attendance;
use crate::store::{AttendanceSource, FinalizeOutcome, PayrollStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingData,
    DuplicateData,
    NegativeNetPay,
    CycleCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub employee_id: Option<u64>,
    pub detail_id: Option<u64>,
    /// The offending net pay for `negative_net_pay`.
    pub amount: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidationResult {
    pub can_finalize: bool,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct PayrollTotals {
    pub employee_count: u64,
    pub total_base_pay: f64,
    pub total_overtime_pay: f64,
    pub total_bonus: f64,
    pub total_deduction: f64,
    pub total_net_pay: f64,
    pub average_net_pay: f64,
}

impl PayrollTotals {
    pub fn from_details(details: &[PayrollDetail]) -> Self {
        let sum = |f: fn(&PayrollDetail) -> f64| round_money(details.iter().map(f).sum());
        let total_net_pay = sum(|d| d.net_pay);
        let employee_count = details.len() as u64;

        Self {
            employee_count,
            total_base_pay: sum(|d| d.base_pay),
            total_overtime_pay: sum(|d| d.overtime_pay),
            total_bonus: sum(|d| d.bonus),
            total_deduction: sum(|d| d.deduction),
            total_net_pay,
            average_net_pay: if employee_count == 0 {
                0.0
            } else {
                round_money(total_net_pay / employee_count as f64)
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CycleSummary {
    pub cycle: PayrollCycle,
    pub validation: ValidationResult,
    pub totals: PayrollTotals,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinalizationSummary {
    pub cycle_id: u64,
    pub cycle_name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub finalized_at: DateTime<Utc>,
    pub finalized_by: u64,
    pub totals: PayrollTotals,
}

/// Finalization rules. Every issue is reported, none short-circuits.
pub fn validate_details(expected_employees: &BTreeSet<u64>, details: &[PayrollDetail]) -> Vec<ValidationIssue> {
    let mut per_employee: BTreeMap<u64, Vec<&PayrollDetail>> = BTreeMap::new();
    for d in details {
        per_employee.entry(d.employee_id).or_default().push(d);
    }

    let mut issues = Vec::new();

    for employee_id in expected_employees {
        if !per_employee.contains_key(employee_id) {
            issues.push(ValidationIssue {
                kind: IssueKind::MissingData,
                employee_id: Some(*employee_id),
                detail_id: None,
                amount: None,
                message: format!("Employee #{employee_id} has attendance but no payroll detail"),
            });
        }
    }

    for (employee_id, rows) in &per_employee {
        if rows.len() > 1 {
            issues.push(ValidationIssue {
                kind: IssueKind::DuplicateData,
                employee_id: Some(*employee_id),
                detail_id: None,
                amount: None,
                message: format!("Employee #{employee_id} has {} payroll details", rows.len()),
            });
        }
        for d in rows.iter().filter(|d| d.net_pay < 0.0) {
            issues.push(ValidationIssue {
                kind: IssueKind::NegativeNetPay,
                employee_id: Some(*employee_id),
                detail_id: Some(d.id),
                amount: Some(d.net_pay),
                message: format!("Employee #{employee_id} has negative net pay {:.2}", d.net_pay),
            });
        }
    }

    issues
}

/// Validates a cycle and performs the one-way `active -> completed` transition.
#[derive(Clone)]
pub struct CycleFinalizer {
    store: Arc<dyn PayrollStore>,
    attendance: Arc<dyn AttendanceSource>,
    audit: AuditTrail,
}

impl CycleFinalizer {
    pub fn new(store: Arc<dyn PayrollStore>, attendance: Arc<dyn AttendanceSource>, audit: AuditTrail) -> Self {
        Self {
            store,
            attendance,
            audit,
        }
    }

    async fn load_cycle(&self, cycle_id: u64) -> Result<PayrollCycle, PayrollError> {
        self.store
            .get_cycle(cycle_id)
            .await?
            .ok_or_else(|| PayrollError::cycle_not_found(cycle_id))
    }

    async fn attended_employees(&self, cycle: &PayrollCycle) -> Result<BTreeSet<u64>, PayrollError> {
        Ok(cycle_attendance(self.attendance.as_ref(), cycle)
            .await?
            .into_keys()
            .collect())
    }

    pub async fn validate_for_finalization(&self, cycle_id: u64) -> Result<ValidationResult, PayrollError> {
        let cycle = self.load_cycle(cycle_id).await?;
        let details = self.store.list_details(cycle_id).await?;
        self.validate_loaded(&cycle, &details).await
    }

    async fn validate_loaded(
        &self,
        cycle: &PayrollCycle,
        details: &[PayrollDetail],
    ) -> Result<ValidationResult, PayrollError> {
        let mut issues = Vec::new();
        if cycle.is_locked() {
            issues.push(ValidationIssue {
                kind: IssueKind::CycleCompleted,
                employee_id: None,
                detail_id: None,
                amount: None,
                message: format!("Payroll cycle #{} is already completed", cycle.id),
            });
        } else {
            let expected = self.attended_employees(cycle).await?;
            issues.extend(validate_details(&expected, details));
        }

        Ok(ValidationResult {
            can_finalize: issues.is_empty(),
            issues,
        })
    }

    /// Validation result plus current totals.
    pub async fn summary(&self, cycle_id: u64) -> Result<CycleSummary, PayrollError> {
        let cycle = self.load_cycle(cycle_id).await?;
        let details = self.store.list_details(cycle_id).await?;
        let validation = self.validate_loaded(&cycle, &details).await?;

        Ok(CycleSummary {
            totals: PayrollTotals::from_details(&details),
            validation,
            cycle,
        })
    }

    /// Re-validates under the cycle lock and commits only if nothing is wrong.
    ///
    /// `AlreadyFinalized` means another caller got there first.
    pub async fn finalize(&self, cycle_id: u64, ctx: &AuditContext) -> Result<FinalizationSummary, PayrollError> {
        let cycle = self.load_cycle(cycle_id).await?;
        if cycle.is_locked() {
            return Err(PayrollError::AlreadyFinalized(cycle_id));
        }

        let expected = self.attended_employees(&cycle).await?;
        let check = move |details: &[PayrollDetail]| validate_details(&expected, details);

        let outcome = self
            .store
            .finalize_cycle(cycle_id, ctx.actor_user_id, Utc::now(), &check)
            .await?;

        let (cycle, details) = match outcome {
            FinalizeOutcome::Finalized { cycle, details } => (cycle, details),
            FinalizeOutcome::AlreadyCompleted => {
                tracing::info!(cycle_id, "Payroll cycle was finalized concurrently");
                return Err(PayrollError::AlreadyFinalized(cycle_id));
            }
            FinalizeOutcome::Blocked(issues) => {
                tracing::warn!(cycle_id, issues = issues.len(), "Payroll cycle failed finalization checks");
                return Err(PayrollError::FinalizationBlocked { cycle_id, issues });
            }
        };

        let totals = PayrollTotals::from_details(&details);
        let finalized_at = cycle.finalized_at.unwrap_or_else(Utc::now);
        let summary = FinalizationSummary {
            cycle_id,
            cycle_name: cycle.name.clone(),
            period_start: cycle.period_start,
            period_end: cycle.period_end,
            finalized_at,
            finalized_by: ctx.actor_user_id,
            totals,
        };

        tracing::info!(
            cycle_id,
            finalized_by = ctx.actor_user_id,
            employees = totals.employee_count,
            total_net_pay = totals.total_net_pay,
            "Payroll cycle finalized"
        );

        self.audit
            .record(ctx.entry(
                AuditAction::Calculate,
                PAYROLL_CYCLES,
                cycle_id,
                Some(json!({ "status": "active" })),
                Some(json!({
                    "status": cycle.status,
                    "finalized_at": finalized_at,
                    "finalized_by": ctx.actor_user_id,
                    "validation_passed": true,
                    "totals": totals,
                })),
                format!(
                    "Finalized payroll cycle '{}' ({} to {}): {} employee(s), net pay total {:.2}",
                    cycle.name, cycle.period_start, cycle.period_end, totals.employee_count, totals.total_net_pay
                ),
            ))
            .await;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{Fixture, HookedStore};
    use crate::model::payroll_cycle::CycleStatus;
    use chrono::Duration;

    /// Employee 1 has a detail; employee 2 attended but has none.
    async fn ready_cycle(fx: &Fixture) -> (PayrollCycle, PayrollDetail) {
        let cycle = fx.january().await;
        fx.store.set_rates(1, 50.0, 600.0);
        fx.shift(1, "2026-01-05 09:00:00", 8.0);
        let report = fx.payroll.calculate(cycle.id, &fx.ctx()).await.unwrap();
        let detail = fx.payroll.get_detail(report.employees[0].detail_id).await.unwrap();
        (cycle, detail)
    }

    #[actix_web::test]
    async fn both_problems_are_reported_together() {
        let fx = Fixture::new();
        let cycle = fx.january().await;
        fx.shift(1, "2026-01-05 09:00:00", 8.0);
        fx.shift(2, "2026-01-05 09:00:00", 8.0);
        let detail = fx.seed_detail(cycle.id, 2, 0.0).await;
        fx.adjustments
            .set_deduction(detail.id, 500.0, Some("salary advance".into()), &fx.ctx())
            .await
            .unwrap();

        let result = fx.finalizer.validate_for_finalization(cycle.id).await.unwrap();
        assert!(!result.can_finalize);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].kind, IssueKind::MissingData);
        assert_eq!(result.issues[0].employee_id, Some(1));
        assert_eq!(result.issues[1].kind, IssueKind::NegativeNetPay);
        assert_eq!(result.issues[1].employee_id, Some(2));
        assert_eq!(result.issues[1].amount, Some(-500.0));
    }

    #[actix_web::test]
    async fn finalize_locks_the_cycle_and_reports_totals() {
        let fx = Fixture::new();
        let (cycle, detail) = ready_cycle(&fx).await;
        fx.adjustments
            .set_bonus(detail.id, 100.0, Some("perfect attendance".into()), &fx.ctx())
            .await
            .unwrap();

        let summary = fx.finalizer.finalize(cycle.id, &fx.ctx()).await.unwrap();
        assert_eq!(summary.finalized_by, 42);
        assert_eq!(summary.totals.employee_count, 1);
        assert_eq!(summary.totals.total_base_pay, 400.0);
        assert_eq!(summary.totals.total_bonus, 100.0);
        assert_eq!(summary.totals.total_net_pay, 500.0);
        assert_eq!(summary.totals.average_net_pay, 500.0);

        let stored = fx.payroll.get_cycle(cycle.id).await.unwrap();
        assert_eq!(stored.status, CycleStatus::Completed);
        assert_eq!(stored.finalized_by, Some(42));
        assert!(stored.finalized_at.is_some());

        let entry = fx.store.audit_entries().pop().unwrap();
        assert_eq!(entry.action, AuditAction::Calculate);
        assert_eq!(entry.table_name, PAYROLL_CYCLES);
        let new_values = entry.new_values.unwrap();
        assert_eq!(new_values["validation_passed"], true);
        assert_eq!(new_values["finalized_by"], 42);
        assert_eq!(new_values["totals"]["total_net_pay"], 500.0);
    }

    #[actix_web::test]
    async fn completed_cycle_rejects_every_write() {
        let fx = Fixture::new();
        let (cycle, detail) = ready_cycle(&fx).await;
        fx.finalizer.finalize(cycle.id, &fx.ctx()).await.unwrap();
        let ctx = fx.ctx();

        let bonus = fx.adjustments.set_bonus(detail.id, 10.0, Some("late".into()), &ctx).await;
        assert!(matches!(bonus, Err(PayrollError::CycleLocked(id)) if id == cycle.id));

        let deduction = fx.adjustments.clear_deduction(detail.id, &ctx).await;
        assert!(matches!(deduction, Err(PayrollError::CycleLocked(_))));

        let overtime = fx.adjustments.set_overtime(detail.id, 1.0, 1.0, &ctx).await;
        assert!(matches!(overtime, Err(PayrollError::CycleLocked(_))));

        let calculate = fx.payroll.calculate(cycle.id, &ctx).await;
        assert!(matches!(calculate, Err(PayrollError::CycleLocked(_))));

        let delete = fx.payroll.delete_detail(detail.id, &ctx).await;
        assert!(matches!(delete, Err(PayrollError::CycleLocked(_))));

        let upsert = fx.store.upsert_base_pay(cycle.id, 99, 1.0, Utc::now()).await;
        assert!(matches!(upsert, Err(PayrollError::CycleLocked(_))));

        let again = fx.finalizer.finalize(cycle.id, &ctx).await;
        assert!(matches!(again, Err(PayrollError::AlreadyFinalized(_))));

        assert_eq!(fx.payroll.get_detail(detail.id).await.unwrap(), detail);
    }

    #[actix_web::test]
    async fn concurrent_finalize_has_exactly_one_winner() {
        let fx = Fixture::new();
        let (cycle, _) = ready_cycle(&fx).await;
        let ctx_a = AuditContext {
            actor_user_id: 1,
            ..fx.ctx()
        };
        let ctx_b = AuditContext {
            actor_user_id: 2,
            ..fx.ctx()
        };

        let (a, b) = futures::join!(
            fx.finalizer.finalize(cycle.id, &ctx_a),
            fx.finalizer.finalize(cycle.id, &ctx_b)
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(PayrollError::AlreadyFinalized(_))));

        let stored = fx.payroll.get_cycle(cycle.id).await.unwrap();
        let winner_id = stored.finalized_by.unwrap();
        assert!(winner_id == 1 || winner_id == 2);
        let finalize_entries = fx
            .store
            .audit_entries()
            .into_iter()
            .filter(|e| e.action == AuditAction::Calculate && e.new_values.as_ref().is_some_and(|v| v.get("validation_passed").is_some()))
            .count();
        assert_eq!(finalize_entries, 1);
    }

    #[actix_web::test]
    async fn finalize_revalidates_instead_of_trusting_an_earlier_check() {
        let fx = Fixture::new();
        let (cycle, detail) = ready_cycle(&fx).await;

        let earlier = fx.finalizer.validate_for_finalization(cycle.id).await.unwrap();
        assert!(earlier.can_finalize);

        fx.adjustments
            .set_deduction(detail.id, 1000.0, Some("overpayment recovery".into()), &fx.ctx())
            .await
            .unwrap();

        let err = fx.finalizer.finalize(cycle.id, &fx.ctx()).await.unwrap_err();
        match err {
            PayrollError::FinalizationBlocked { issues, .. } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].kind, IssueKind::NegativeNetPay);
                assert_eq!(issues[0].amount, Some(-600.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!fx.payroll.get_cycle(cycle.id).await.unwrap().is_locked());
    }

    #[actix_web::test]
    async fn summary_of_completed_cycle_cannot_finalize() {
        let fx = Fixture::new();
        let (cycle, _) = ready_cycle(&fx).await;
        fx.finalizer.finalize(cycle.id, &fx.ctx()).await.unwrap();

        let summary = fx.finalizer.summary(cycle.id).await.unwrap();
        assert!(!summary.validation.can_finalize);
        assert_eq!(summary.validation.issues[0].kind, IssueKind::CycleCompleted);
        assert_eq!(summary.totals.total_net_pay, 400.0);
    }

    #[test]
    fn totals_of_an_empty_cycle_are_zero() {
        assert_eq!(PayrollTotals::from_details(&[]), PayrollTotals::default());
    }

    #[actix_web::test]
    async fn unknown_cycle_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.finalizer.finalize(77, &fx.ctx()).await,
            Err(PayrollError::NotFound { .. })
        ));
    }

    #[actix_web::test]
    async fn store_completes_a_cycle_only_once() {
        let fx = Fixture::new();
        let (cycle, _) = ready_cycle(&fx).await;
        let first_at = Utc::now();
        let pass = |_: &[PayrollDetail]| Vec::<ValidationIssue>::new();

        let first = fx.store.finalize_cycle(cycle.id, 1, first_at, &pass).await.unwrap();
        assert!(matches!(first, FinalizeOutcome::Finalized { .. }));

        let second = fx
            .store
            .finalize_cycle(cycle.id, 2, first_at + Duration::seconds(30), &pass)
            .await
            .unwrap();
        assert!(matches!(second, FinalizeOutcome::AlreadyCompleted));

        let stored = fx.payroll.get_cycle(cycle.id).await.unwrap();
        assert_eq!(stored.finalized_by, Some(1));
        assert_eq!(stored.finalized_at, Some(first_at));
    }

    #[actix_web::test]
    async fn losing_the_commit_race_is_already_finalized() {
        let fx = Fixture::with_payroll_store(|store| HookedStore::with_rival_finalizer(store, 99));
        let (cycle, _) = ready_cycle(&fx).await;

        // The pre-check sees an active cycle; the rival commits before our transition.
        let err = fx.finalizer.finalize(cycle.id, &fx.ctx()).await.unwrap_err();
        assert!(matches!(err, PayrollError::AlreadyFinalized(id) if id == cycle.id));

        let stored = fx.payroll.get_cycle(cycle.id).await.unwrap();
        assert_eq!(stored.status, CycleStatus::Completed);
        assert_eq!(stored.finalized_by, Some(99));
        let rival_at = stored.finalized_at;
        assert!(rival_at.is_some());

        let again = fx.finalizer.finalize(cycle.id, &fx.ctx()).await;
        assert!(matches!(again, Err(PayrollError::AlreadyFinalized(_))));
        let stored = fx.payroll.get_cycle(cycle.id).await.unwrap();
        assert_eq!(stored.finalized_by, Some(99));
        assert_eq!(stored.finalized_at, rival_at);

        let finalize_entries = fx
            .store
            .audit_entries()
            .into_iter()
            .filter(|e| e.new_values.as_ref().is_some_and(|v| v.get("validation_passed").is_some()))
            .count();
        assert_eq!(finalize_entries, 0);
    }
}

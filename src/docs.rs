use crate::api::payroll_detail::{SetBonus, SetDeduction, SetOvertime};
use crate::model::audit_log::{AuditAction, AuditLogEntry, AuditQuery};
use crate::model::payroll_cycle::{CycleStatus, NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::PayrollDetail;
use crate::service::adjustment::{
    AdjustmentPreview, AdjustmentProposal, AdjustmentValues, AmountChange, ChangeKind, ChangesSummary,
};
use crate::service::audit::AuditHealth;
use crate::service::calculator::{IntervalPay, RateApplied};
use crate::service::finalizer::{
    CycleSummary, FinalizationSummary, IssueKind, PayrollTotals, ValidationIssue, ValidationResult,
};
use crate::service::payroll::{CalculationReport, EmployeeCalculation, SkippedEmployee};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Engine API",
        version = "1.0.0",
        description = r#"
## Payroll Engine

Computes and finalizes per-employee pay for a payroll cycle.

### 🔹 Key Features
- **Base pay** from attendance: hourly rate, or the flat daily rate for intervals longer than the configured threshold
- **Adjustments**: bonus, deduction and overtime, each with net pay recomputed on write
- **Finalization**: validation, totals, and a one-way lock of the cycle
- **Audit trail**: every change with actor, before/after values, IP and user agent

### 🔐 Security
Every endpoint requires a **JWT Bearer** access token of an **Admin**.

### 📦 Errors
Errors are JSON `{ "error", "code" }`; validation errors add `details`, blocked finalization adds `issues`.
"#,
    ),
    paths(
        crate::api::payroll_cycle::create_cycle,
        crate::api::payroll_cycle::list_cycles,
        crate::api::payroll_cycle::get_cycle,
        crate::api::payroll_cycle::list_details,
        crate::api::payroll_cycle::calculate,
        crate::api::payroll_cycle::summary,
        crate::api::payroll_cycle::finalize,

        crate::api::payroll_detail::get_detail,
        crate::api::payroll_detail::delete_detail,
        crate::api::payroll_detail::set_bonus,
        crate::api::payroll_detail::clear_bonus,
        crate::api::payroll_detail::set_deduction,
        crate::api::payroll_detail::clear_deduction,
        crate::api::payroll_detail::set_overtime,
        crate::api::payroll_detail::preview_adjustment,

        crate::api::audit_log::list_audit_logs,
        crate::api::audit_log::audit_status
    ),
    components(
        schemas(
            CycleStatus,
            PayrollCycle,
            NewPayrollCycle,
            PayrollDetail,
            SetBonus,
            SetDeduction,
            SetOvertime,
            RateApplied,
            IntervalPay,
            EmployeeCalculation,
            SkippedEmployee,
            CalculationReport,
            IssueKind,
            ValidationIssue,
            ValidationResult,
            PayrollTotals,
            CycleSummary,
            FinalizationSummary,
            AdjustmentProposal,
            AdjustmentValues,
            ChangeKind,
            AmountChange,
            ChangesSummary,
            AdjustmentPreview,
            AuditAction,
            AuditLogEntry,
            AuditQuery,
            AuditHealth
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll Cycle", description = "Cycle lifecycle: calculate, summarize, finalize"),
        (name = "Payroll Detail", description = "Per-employee pay and adjustments"),
        (name = "Audit", description = "Change history"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

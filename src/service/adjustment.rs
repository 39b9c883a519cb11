use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::error::PayrollError;
use crate::model::audit_log::{AuditAction, PAYROLL_DETAILS};
use crate::model::payroll_detail::{Adjustment, PayrollDetail, round_money};
use crate::service::audit::{AuditContext, AuditTrail};
use crate::store::{DetailChange, PayrollStore};

pub const MAX_REASON_CHARS: usize = 500;

/// The adjustable amounts of a detail at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdjustmentValues {
    pub bonus: f64,
    pub deduction: f64,
    pub net_pay: f64,
}

impl From<&PayrollDetail> for AdjustmentValues {
    fn from(d: &PayrollDetail) -> Self {
        Self {
            bonus: d.bonus,
            deduction: d.deduction,
            net_pay: d.net_pay,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct AdjustmentReasons {
    pub bonus_reason: Option<String>,
    pub deduction_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AmountChange {
    pub kind: ChangeKind,
    pub old: f64,
    pub new: f64,
    pub delta: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChangesSummary {
    pub bonus: Option<AmountChange>,
    pub deduction: Option<AmountChange>,
    /// Signed.
    pub net_pay_delta: f64,
    pub has_changes: bool,
}

fn amount_change(old: f64, new: f64, reason: Option<&String>) -> Option<AmountChange> {
    if old == new {
        return None;
    }
    let kind = if old == 0.0 {
        ChangeKind::Added
    } else if new == 0.0 {
        ChangeKind::Removed
    } else {
        ChangeKind::Changed
    };
    Some(AmountChange {
        kind,
        old,
        new,
        delta: round_money(new - old),
        reason: if new > 0.0 { reason.cloned() } else { None },
    })
}

/// Structured diff of a bonus/deduction change. Reads nothing, writes nothing.
pub fn create_changes_summary(
    old: &AdjustmentValues,
    new: &AdjustmentValues,
    reasons: &AdjustmentReasons,
) -> ChangesSummary {
    let bonus = amount_change(old.bonus, new.bonus, reasons.bonus_reason.as_ref());
    let deduction = amount_change(old.deduction, new.deduction, reasons.deduction_reason.as_ref());
    let net_pay_delta = round_money(new.net_pay - old.net_pay);

    ChangesSummary {
        has_changes: bonus.is_some() || deduction.is_some() || net_pay_delta != 0.0,
        bonus,
        deduction,
        net_pay_delta,
    }
}

/// Checks an amount and its justification, collecting every violation.
pub fn validate_amount(field: &str, amount: f64, reason: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();

    if !amount.is_finite() {
        errors.push(format!("{field} must be a finite number"));
    } else if amount < 0.0 {
        errors.push(format!("{field} must be zero or greater"));
    }

    if amount > 0.0 {
        match reason.map(str::trim) {
            None | Some("") => {
                errors.push(format!("{field}_reason is required when {field} is greater than zero"))
            }
            Some(r) if r.chars().count() > MAX_REASON_CHARS => errors.push(format!(
                "{field}_reason must be at most {MAX_REASON_CHARS} characters"
            )),
            Some(_) => {}
        }
    }

    errors
}

fn validate_overtime(hours: f64, rate: f64) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, value) in [("overtime_hours", hours), ("overtime_rate", rate)] {
        if !value.is_finite() {
            errors.push(format!("{field} must be a finite number"));
        } else if value < 0.0 {
            errors.push(format!("{field} must be zero or greater"));
        }
    }
    errors
}

fn clean_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

fn adjustment_snapshot(d: &PayrollDetail) -> Value {
    json!({
        "bonus": d.bonus,
        "bonus_reason": d.bonus_reason,
        "deduction": d.deduction,
        "deduction_reason": d.deduction_reason,
        "net_pay": d.net_pay,
    })
}

fn overtime_snapshot(d: &PayrollDetail) -> Value {
    json!({
        "overtime_hours": d.overtime_hours,
        "overtime_rate": d.overtime_rate,
        "overtime_pay": d.overtime_pay,
        "net_pay": d.net_pay,
    })
}

fn describe(label: &str, employee_id: u64, change: Option<&AmountChange>, net_pay_delta: f64) -> String {
    match change {
        None => format!("{label} for employee #{employee_id} left unchanged"),
        Some(c) => {
            let head = match c.kind {
                ChangeKind::Added => format!("{label} of {:.2} added for employee #{employee_id}", c.new),
                ChangeKind::Removed => format!("{label} of {:.2} removed for employee #{employee_id}", c.old),
                ChangeKind::Changed => format!(
                    "{label} for employee #{employee_id} changed from {:.2} to {:.2}",
                    c.old, c.new
                ),
            };
            match &c.reason {
                Some(reason) => format!("{head} (net pay {net_pay_delta:+.2}): {reason}"),
                None => format!("{head} (net pay {net_pay_delta:+.2})"),
            }
        }
    }
}

/// Proposed values for a preview. Omitted fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AdjustmentProposal {
    #[schema(example = 3000.0)]
    pub bonus: Option<f64>,
    #[schema(example = "Exceptional quarter")]
    pub bonus_reason: Option<String>,
    pub deduction: Option<f64>,
    pub deduction_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdjustmentPreview {
    pub detail_id: u64,
    pub employee_id: u64,
    pub current: AdjustmentValues,
    pub proposed: AdjustmentValues,
    pub changes: ChangesSummary,
    pub validation_errors: Vec<String>,
    pub cycle_locked: bool,
}

/// Bonus, deduction and overtime writes on a single payroll detail.
#[derive(Clone)]
pub struct AdjustmentService {
    store: Arc<dyn PayrollStore>,
    audit: AuditTrail,
}

impl AdjustmentService {
    pub fn new(store: Arc<dyn PayrollStore>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    pub async fn set_bonus(
        &self,
        detail_id: u64,
        amount: f64,
        reason: Option<String>,
        ctx: &AuditContext,
    ) -> Result<PayrollDetail, PayrollError> {
        let errors = validate_amount("bonus", amount, reason.as_deref());
        if !errors.is_empty() {
            return Err(PayrollError::validation(errors));
        }

        let adjustment = Adjustment::Bonus {
            amount,
            reason: clean_reason(reason),
        };
        self.apply_amount("Bonus", detail_id, &adjustment, ctx).await
    }

    pub async fn clear_bonus(&self, detail_id: u64, ctx: &AuditContext) -> Result<PayrollDetail, PayrollError> {
        self.set_bonus(detail_id, 0.0, None, ctx).await
    }

    pub async fn set_deduction(
        &self,
        detail_id: u64,
        amount: f64,
        reason: Option<String>,
        ctx: &AuditContext,
    ) -> Result<PayrollDetail, PayrollError> {
        let errors = validate_amount("deduction", amount, reason.as_deref());
        if !errors.is_empty() {
            return Err(PayrollError::validation(errors));
        }

        let adjustment = Adjustment::Deduction {
            amount,
            reason: clean_reason(reason),
        };
        self.apply_amount("Deduction", detail_id, &adjustment, ctx).await
    }

    pub async fn clear_deduction(&self, detail_id: u64, ctx: &AuditContext) -> Result<PayrollDetail, PayrollError> {
        self.set_deduction(detail_id, 0.0, None, ctx).await
    }

    async fn apply_amount(
        &self,
        label: &str,
        detail_id: u64,
        adjustment: &Adjustment,
        ctx: &AuditContext,
    ) -> Result<PayrollDetail, PayrollError> {
        let DetailChange { before, after } = self.store.apply_adjustment(detail_id, adjustment).await?;
        let before = before.unwrap_or_else(|| after.clone());

        let reasons = AdjustmentReasons {
            bonus_reason: after.bonus_reason.clone(),
            deduction_reason: after.deduction_reason.clone(),
        };
        let summary = create_changes_summary(
            &AdjustmentValues::from(&before),
            &AdjustmentValues::from(&after),
            &reasons,
        );
        let change = match adjustment {
            Adjustment::Bonus { .. } => summary.bonus.as_ref(),
            _ => summary.deduction.as_ref(),
        };

        tracing::info!(
            detail_id,
            employee_id = after.employee_id,
            cycle_id = after.payroll_cycle_id,
            actor_user_id = ctx.actor_user_id,
            net_pay = after.net_pay,
            "{label} updated"
        );

        self.audit
            .record(ctx.entry(
                AuditAction::Update,
                PAYROLL_DETAILS,
                detail_id,
                Some(adjustment_snapshot(&before)),
                Some(adjustment_snapshot(&after)),
                describe(label, after.employee_id, change, summary.net_pay_delta),
            ))
            .await;

        Ok(after)
    }

    pub async fn set_overtime(
        &self,
        detail_id: u64,
        hours: f64,
        rate: f64,
        ctx: &AuditContext,
    ) -> Result<PayrollDetail, PayrollError> {
        let errors = validate_overtime(hours, rate);
        if !errors.is_empty() {
            return Err(PayrollError::validation(errors));
        }

        let DetailChange { before, after } = self
            .store
            .apply_adjustment(detail_id, &Adjustment::Overtime { hours, rate })
            .await?;
        let before = before.unwrap_or_else(|| after.clone());

        tracing::info!(
            detail_id,
            employee_id = after.employee_id,
            overtime_pay = after.overtime_pay,
            "Overtime updated"
        );

        let description = format!(
            "Overtime for employee #{} changed from {:.2}h at {:.2} to {:.2}h at {:.2} (net pay {:+.2})",
            after.employee_id,
            before.overtime_hours,
            before.overtime_rate,
            after.overtime_hours,
            after.overtime_rate,
            round_money(after.net_pay - before.net_pay),
        );
        self.audit
            .record(ctx.entry(
                AuditAction::Update,
                PAYROLL_DETAILS,
                detail_id,
                Some(overtime_snapshot(&before)),
                Some(overtime_snapshot(&after)),
                description,
            ))
            .await;

        Ok(after)
    }

    /// What a bonus/deduction change would do, without applying it.
    pub async fn preview(
        &self,
        detail_id: u64,
        proposal: &AdjustmentProposal,
    ) -> Result<AdjustmentPreview, PayrollError> {
        let current = self
            .store
            .get_detail(detail_id)
            .await?
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))?;
        let cycle_locked = self
            .store
            .get_cycle(current.payroll_cycle_id)
            .await?
            .is_some_and(|c| c.is_locked());

        let mut validation_errors = Vec::new();
        let mut proposed = current.clone();

        if let Some(amount) = proposal.bonus {
            validation_errors.extend(validate_amount("bonus", amount, proposal.bonus_reason.as_deref()));
            proposed = proposed.adjusted(&Adjustment::Bonus {
                amount,
                reason: clean_reason(proposal.bonus_reason.clone()),
            });
        }
        if let Some(amount) = proposal.deduction {
            validation_errors.extend(validate_amount(
                "deduction",
                amount,
                proposal.deduction_reason.as_deref(),
            ));
            proposed = proposed.adjusted(&Adjustment::Deduction {
                amount,
                reason: clean_reason(proposal.deduction_reason.clone()),
            });
        }

        let reasons = AdjustmentReasons {
            bonus_reason: proposed.bonus_reason.clone(),
            deduction_reason: proposed.deduction_reason.clone(),
        };
        let current_values = AdjustmentValues::from(&current);
        let proposed_values = AdjustmentValues::from(&proposed);

        Ok(AdjustmentPreview {
            detail_id,
            employee_id: current.employee_id,
            current: current_values,
            proposed: proposed_values,
            changes: create_changes_summary(&current_values, &proposed_values, &reasons),
            validation_errors,
            cycle_locked,
        })
    }
}

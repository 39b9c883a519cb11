use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::PayrollError;
use crate::model::attendance::{AttendanceInterval, PayRates};
use crate::model::audit_log::{AuditLogEntry, AuditQuery, NewAuditLog};
use crate::model::payroll_cycle::{NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::{Adjustment, PayrollDetail};
use crate::service::finalizer::ValidationIssue;

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub type StoreResult<T> = Result<T, PayrollError>;

/// Before/after pair of a single detail write.
#[derive(Debug, Clone)]
pub struct DetailChange {
    pub before: Option<PayrollDetail>,
    pub after: PayrollDetail,
}

/// Re-validation run inside the finalize transaction against the locked details.
pub type FinalizationCheck = dyn Fn(&[PayrollDetail]) -> Vec<ValidationIssue> + Send + Sync;

#[derive(Debug)]
pub enum FinalizeOutcome {
    Finalized {
        cycle: PayrollCycle,
        details: Vec<PayrollDetail>,
    },
    Blocked(Vec<ValidationIssue>),
    AlreadyCompleted,
}

/// Cycles and their details.
///
/// Every write to a detail checks the owning cycle inside the same transaction,
/// so nothing lands on a completed cycle. Writes to one detail are serialized.
#[async_trait]
pub trait PayrollStore: Send + Sync {
    async fn create_cycle(&self, cycle: &NewPayrollCycle, at: DateTime<Utc>) -> StoreResult<PayrollCycle>;

    async fn get_cycle(&self, cycle_id: u64) -> StoreResult<Option<PayrollCycle>>;

    async fn list_cycles(&self) -> StoreResult<Vec<PayrollCycle>>;

    async fn get_detail(&self, detail_id: u64) -> StoreResult<Option<PayrollDetail>>;

    async fn find_detail(&self, cycle_id: u64, employee_id: u64) -> StoreResult<Option<PayrollDetail>>;

    async fn list_details(&self, cycle_id: u64) -> StoreResult<Vec<PayrollDetail>>;

    /// Inserts or replaces base pay, keeping overtime, bonus and deduction.
    async fn upsert_base_pay(
        &self,
        cycle_id: u64,
        employee_id: u64,
        base_pay: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<DetailChange>;

    async fn apply_adjustment(&self, detail_id: u64, adjustment: &Adjustment) -> StoreResult<DetailChange>;

    async fn delete_detail(&self, detail_id: u64) -> StoreResult<PayrollDetail>;

    /// Compare-and-swap `active -> completed`, guarded by `check`.
    async fn finalize_cycle(
        &self,
        cycle_id: u64,
        finalized_by: u64,
        at: DateTime<Utc>,
        check: &FinalizationCheck,
    ) -> StoreResult<FinalizeOutcome>;
}

/// Read side of the attendance module.
#[async_trait]
pub trait AttendanceSource: Send + Sync {
    /// Intervals touching `[start, end]` (inclusive dates).
    async fn intervals_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<AttendanceInterval>>;

    async fn pay_rates(&self, employee_ids: &[u64]) -> StoreResult<HashMap<u64, PayRates>>;
}

/// Append-only: there is no update or delete.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_log(&self, entry: &NewAuditLog, at: DateTime<Utc>) -> StoreResult<u64>;

    async fn query_audit_logs(&self, query: &AuditQuery, limit: u32) -> StoreResult<Vec<AuditLogEntry>>;
}

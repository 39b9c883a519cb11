use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AttendanceSource, AuditStore, DetailChange, FinalizationCheck, FinalizeOutcome, PayrollStore,
    StoreResult,
};
use crate::error::PayrollError;
use crate::model::attendance::{AttendanceInterval, PayRates};
use crate::model::audit_log::{AuditLogEntry, AuditQuery, NewAuditLog};
use crate::model::payroll_cycle::{CycleStatus, NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::{Adjustment, PayrollDetail};

#[derive(Default)]
struct State {
    next_id: u64,
    cycles: BTreeMap<u64, PayrollCycle>,
    details: BTreeMap<u64, PayrollDetail>,
    attendance: Vec<AttendanceInterval>,
    rates: HashMap<u64, PayRates>,
    audit: Vec<AuditLogEntry>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_active(&self, cycle_id: u64) -> StoreResult<()> {
        match self.cycles.get(&cycle_id) {
            None => Err(PayrollError::cycle_not_found(cycle_id)),
            Some(cycle) if cycle.is_locked() => Err(PayrollError::CycleLocked(cycle_id)),
            Some(_) => Ok(()),
        }
    }

    fn detail_cycle(&self, detail_id: u64) -> StoreResult<u64> {
        self.details
            .get(&detail_id)
            .map(|d| d.payroll_cycle_id)
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))
    }
}

/// Single-mutex store used by unit tests. Every operation is one critical section.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_audit_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PayrollError::Storage("memory store poisoned".into()))
    }

    pub fn add_attendance(&self, interval: AttendanceInterval) {
        self.state.lock().unwrap().attendance.push(interval);
    }

    pub fn set_rates(&self, employee_id: u64, hourly_rate: f64, daily_rate: f64) {
        self.state.lock().unwrap().rates.insert(
            employee_id,
            PayRates {
                hourly_rate,
                daily_rate,
            },
        );
    }

    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.lock().unwrap().audit.clone()
    }
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn create_cycle(&self, cycle: &NewPayrollCycle, at: DateTime<Utc>) -> StoreResult<PayrollCycle> {
        let mut state = self.lock()?;
        let created = PayrollCycle {
            id: state.next_id(),
            name: cycle.name.trim().to_string(),
            period_start: cycle.period_start,
            period_end: cycle.period_end,
            status: CycleStatus::Active,
            created_at: at,
            finalized_at: None,
            finalized_by: None,
        };
        state.cycles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_cycle(&self, cycle_id: u64) -> StoreResult<Option<PayrollCycle>> {
        Ok(self.lock()?.cycles.get(&cycle_id).cloned())
    }

    async fn list_cycles(&self) -> StoreResult<Vec<PayrollCycle>> {
        let mut cycles: Vec<_> = self.lock()?.cycles.values().cloned().collect();
        cycles.sort_by(|a, b| b.period_start.cmp(&a.period_start).then(b.id.cmp(&a.id)));
        Ok(cycles)
    }

    async fn get_detail(&self, detail_id: u64) -> StoreResult<Option<PayrollDetail>> {
        Ok(self.lock()?.details.get(&detail_id).cloned())
    }

    async fn find_detail(&self, cycle_id: u64, employee_id: u64) -> StoreResult<Option<PayrollDetail>> {
        Ok(self
            .lock()?
            .details
            .values()
            .find(|d| d.payroll_cycle_id == cycle_id && d.employee_id == employee_id)
            .cloned())
    }

    async fn list_details(&self, cycle_id: u64) -> StoreResult<Vec<PayrollDetail>> {
        let mut details: Vec<_> = self
            .lock()?
            .details
            .values()
            .filter(|d| d.payroll_cycle_id == cycle_id)
            .cloned()
            .collect();
        details.sort_by_key(|d| d.employee_id);
        Ok(details)
    }

    async fn upsert_base_pay(
        &self,
        cycle_id: u64,
        employee_id: u64,
        base_pay: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<DetailChange> {
        let mut state = self.lock()?;
        state.require_active(cycle_id)?;

        let existing = state
            .details
            .values()
            .find(|d| d.payroll_cycle_id == cycle_id && d.employee_id == employee_id)
            .cloned();

        let after = match &existing {
            Some(before) => before.with_base_pay(base_pay),
            None => {
                let mut fresh = PayrollDetail::new(cycle_id, employee_id, base_pay, at);
                fresh.id = state.next_id();
                fresh
            }
        };
        state.details.insert(after.id, after.clone());

        Ok(DetailChange {
            before: existing,
            after,
        })
    }

    async fn apply_adjustment(&self, detail_id: u64, adjustment: &Adjustment) -> StoreResult<DetailChange> {
        let mut state = self.lock()?;
        let cycle_id = state.detail_cycle(detail_id)?;
        state.require_active(cycle_id)?;

        let before = state.details[&detail_id].clone();
        let after = before.adjusted(adjustment);
        state.details.insert(detail_id, after.clone());

        Ok(DetailChange {
            before: Some(before),
            after,
        })
    }

    async fn delete_detail(&self, detail_id: u64) -> StoreResult<PayrollDetail> {
        let mut state = self.lock()?;
        let cycle_id = state.detail_cycle(detail_id)?;
        state.require_active(cycle_id)?;

        state
            .details
            .remove(&detail_id)
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))
    }

    async fn finalize_cycle(
        &self,
        cycle_id: u64,
        finalized_by: u64,
        at: DateTime<Utc>,
        check: &FinalizationCheck,
    ) -> StoreResult<FinalizeOutcome> {
        let mut state = self.lock()?;
        let cycle = state
            .cycles
            .get(&cycle_id)
            .cloned()
            .ok_or_else(|| PayrollError::cycle_not_found(cycle_id))?;
        if cycle.is_locked() {
            return Ok(FinalizeOutcome::AlreadyCompleted);
        }

        let mut details: Vec<_> = state
            .details
            .values()
            .filter(|d| d.payroll_cycle_id == cycle_id)
            .cloned()
            .collect();
        details.sort_by_key(|d| d.employee_id);

        let issues = check(&details);
        if !issues.is_empty() {
            return Ok(FinalizeOutcome::Blocked(issues));
        }

        let mut cycle = cycle;
        cycle.status = CycleStatus::Completed;
        cycle.finalized_at = Some(at);
        cycle.finalized_by = Some(finalized_by);
        state.cycles.insert(cycle_id, cycle.clone());

        Ok(FinalizeOutcome::Finalized { cycle, details })
    }
}

#[async_trait]
impl AttendanceSource for MemoryStore {
    async fn intervals_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<AttendanceInterval>> {
        Ok(self
            .lock()?
            .attendance
            .iter()
            .filter(|i| {
                let last = i.check_out_at.unwrap_or(i.check_in_at).max(i.check_in_at);
                i.check_in_at.date() <= end && last.date() >= start
            })
            .cloned()
            .collect())
    }

    async fn pay_rates(&self, employee_ids: &[u64]) -> StoreResult<HashMap<u64, PayRates>> {
        let state = self.lock()?;
        Ok(employee_ids
            .iter()
            .filter_map(|id| state.rates.get(id).map(|r| (*id, *r)))
            .collect())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_log(&self, entry: &NewAuditLog, at: DateTime<Utc>) -> StoreResult<u64> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(PayrollError::Storage("audit table unavailable".into()));
        }

        let mut state = self.lock()?;
        let id = state.next_id();
        state.audit.push(AuditLogEntry {
            id,
            actor_user_id: entry.actor_user_id,
            action: entry.action,
            table_name: entry.table_name.clone(),
            record_id: entry.record_id,
            old_values: entry.old_values.clone(),
            new_values: entry.new_values.clone(),
            description: entry.description.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            created_at: at,
        });
        Ok(id)
    }

    async fn query_audit_logs(&self, query: &AuditQuery, limit: u32) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| query.table_name.as_ref().is_none_or(|t| &e.table_name == t))
            .filter(|e| query.record_id.is_none_or(|r| e.record_id == r))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

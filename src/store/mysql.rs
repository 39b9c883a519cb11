use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder, Transaction};

use super::{
    AttendanceSource, AuditStore, DetailChange, FinalizationCheck, FinalizeOutcome, PayrollStore,
    StoreResult,
};
use crate::error::PayrollError;
use crate::model::attendance::{AttendanceInterval, PayRates};
use crate::model::audit_log::{AuditAction, AuditLogEntry, AuditQuery, NewAuditLog};
use crate::model::payroll_cycle::{CycleStatus, NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::{Adjustment, PayrollDetail};

const CYCLE_COLUMNS: &str =
    "id, name, period_start, period_end, status, created_at, finalized_at, finalized_by";

const DETAIL_COLUMNS: &str = "id, payroll_cycle_id, employee_id, base_pay, overtime_hours, \
     overtime_rate, overtime_pay, bonus, bonus_reason, deduction, deduction_reason, net_pay, created_at";

/// MySQL-backed store.
///
/// Lock order is always cycle row first, detail rows second. Detail writers take
/// a shared lock on the cycle, finalize takes an exclusive one.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: String) -> StoreResult<CycleStatus> {
    CycleStatus::try_from(raw.clone())
        .map_err(|_| PayrollError::Storage(format!("unknown payroll cycle status {raw:?}")))
}

/// Shared lock on the cycle row; fails when the cycle is gone or completed.
async fn lock_active_cycle(tx: &mut Transaction<'_, MySql>, cycle_id: u64) -> StoreResult<()> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM payroll_cycles WHERE id = ? LOCK IN SHARE MODE")
            .bind(cycle_id)
            .fetch_optional(&mut **tx)
            .await?;

    match status.map(parse_status).transpose()? {
        None => Err(PayrollError::cycle_not_found(cycle_id)),
        Some(CycleStatus::Completed) => Err(PayrollError::CycleLocked(cycle_id)),
        Some(CycleStatus::Active) => Ok(()),
    }
}

async fn lock_detail(tx: &mut Transaction<'_, MySql>, detail_id: u64) -> StoreResult<Option<PayrollDetail>> {
    let sql = format!("SELECT {DETAIL_COLUMNS} FROM payroll_details WHERE id = ? FOR UPDATE");
    let detail = sqlx::query_as::<_, PayrollDetail>(&sql)
        .bind(detail_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(detail)
}

async fn write_detail(tx: &mut Transaction<'_, MySql>, d: &PayrollDetail) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE payroll_details
        SET base_pay = ?, overtime_hours = ?, overtime_rate = ?, overtime_pay = ?,
            bonus = ?, bonus_reason = ?, deduction = ?, deduction_reason = ?, net_pay = ?
        WHERE id = ?
        "#,
    )
    .bind(d.base_pay)
    .bind(d.overtime_hours)
    .bind(d.overtime_rate)
    .bind(d.overtime_pay)
    .bind(d.bonus)
    .bind(&d.bonus_reason)
    .bind(d.deduction)
    .bind(&d.deduction_reason)
    .bind(d.net_pay)
    .bind(d.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn owning_cycle(pool: &MySqlPool, detail_id: u64) -> StoreResult<u64> {
    sqlx::query_scalar::<_, u64>("SELECT payroll_cycle_id FROM payroll_details WHERE id = ?")
        .bind(detail_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PayrollError::detail_not_found(detail_id))
}

#[async_trait]
impl PayrollStore for MySqlStore {
    async fn create_cycle(&self, cycle: &NewPayrollCycle, at: DateTime<Utc>) -> StoreResult<PayrollCycle> {
        let result = sqlx::query(
            r#"
            INSERT INTO payroll_cycles (name, period_start, period_end, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(cycle.name.trim())
        .bind(cycle.period_start)
        .bind(cycle.period_end)
        .bind(CycleStatus::Active.as_ref())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(PayrollCycle {
            id: result.last_insert_id(),
            name: cycle.name.trim().to_string(),
            period_start: cycle.period_start,
            period_end: cycle.period_end,
            status: CycleStatus::Active,
            created_at: at,
            finalized_at: None,
            finalized_by: None,
        })
    }

    async fn get_cycle(&self, cycle_id: u64) -> StoreResult<Option<PayrollCycle>> {
        let sql = format!("SELECT {CYCLE_COLUMNS} FROM payroll_cycles WHERE id = ?");
        let cycle = sqlx::query_as::<_, PayrollCycle>(&sql)
            .bind(cycle_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cycle)
    }

    async fn list_cycles(&self) -> StoreResult<Vec<PayrollCycle>> {
        let sql = format!("SELECT {CYCLE_COLUMNS} FROM payroll_cycles ORDER BY period_start DESC, id DESC");
        let cycles = sqlx::query_as::<_, PayrollCycle>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(cycles)
    }

    async fn get_detail(&self, detail_id: u64) -> StoreResult<Option<PayrollDetail>> {
        let sql = format!("SELECT {DETAIL_COLUMNS} FROM payroll_details WHERE id = ?");
        let detail = sqlx::query_as::<_, PayrollDetail>(&sql)
            .bind(detail_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(detail)
    }

    async fn find_detail(&self, cycle_id: u64, employee_id: u64) -> StoreResult<Option<PayrollDetail>> {
        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM payroll_details WHERE payroll_cycle_id = ? AND employee_id = ?"
        );
        let detail = sqlx::query_as::<_, PayrollDetail>(&sql)
            .bind(cycle_id)
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(detail)
    }

    async fn list_details(&self, cycle_id: u64) -> StoreResult<Vec<PayrollDetail>> {
        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM payroll_details WHERE payroll_cycle_id = ? ORDER BY employee_id"
        );
        let details = sqlx::query_as::<_, PayrollDetail>(&sql)
            .bind(cycle_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(details)
    }

    async fn upsert_base_pay(
        &self,
        cycle_id: u64,
        employee_id: u64,
        base_pay: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<DetailChange> {
        let mut tx = self.pool.begin().await?;
        lock_active_cycle(&mut tx, cycle_id).await?;

        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM payroll_details \
             WHERE payroll_cycle_id = ? AND employee_id = ? FOR UPDATE"
        );
        let existing = sqlx::query_as::<_, PayrollDetail>(&sql)
            .bind(cycle_id)
            .bind(employee_id)
            .fetch_optional(&mut *tx)
            .await?;

        let after = match &existing {
            Some(before) => {
                let after = before.with_base_pay(base_pay);
                write_detail(&mut tx, &after).await?;
                after
            }
            None => {
                let mut fresh = PayrollDetail::new(cycle_id, employee_id, base_pay, at);
                let result = sqlx::query(
                    r#"
                    INSERT INTO payroll_details
                    (payroll_cycle_id, employee_id, base_pay, overtime_hours, overtime_rate,
                     overtime_pay, bonus, bonus_reason, deduction, deduction_reason, net_pay, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(fresh.payroll_cycle_id)
                .bind(fresh.employee_id)
                .bind(fresh.base_pay)
                .bind(fresh.overtime_hours)
                .bind(fresh.overtime_rate)
                .bind(fresh.overtime_pay)
                .bind(fresh.bonus)
                .bind(&fresh.bonus_reason)
                .bind(fresh.deduction)
                .bind(&fresh.deduction_reason)
                .bind(fresh.net_pay)
                .bind(fresh.created_at)
                .execute(&mut *tx)
                .await?;
                fresh.id = result.last_insert_id();
                fresh
            }
        };

        tx.commit().await?;
        Ok(DetailChange {
            before: existing,
            after,
        })
    }

    async fn apply_adjustment(&self, detail_id: u64, adjustment: &Adjustment) -> StoreResult<DetailChange> {
        let cycle_id = owning_cycle(&self.pool, detail_id).await?;

        let mut tx = self.pool.begin().await?;
        lock_active_cycle(&mut tx, cycle_id).await?;

        let before = lock_detail(&mut tx, detail_id)
            .await?
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))?;
        let after = before.adjusted(adjustment);
        write_detail(&mut tx, &after).await?;

        tx.commit().await?;
        Ok(DetailChange {
            before: Some(before),
            after,
        })
    }

    async fn delete_detail(&self, detail_id: u64) -> StoreResult<PayrollDetail> {
        let cycle_id = owning_cycle(&self.pool, detail_id).await?;

        let mut tx = self.pool.begin().await?;
        lock_active_cycle(&mut tx, cycle_id).await?;

        let before = lock_detail(&mut tx, detail_id)
            .await?
            .ok_or_else(|| PayrollError::detail_not_found(detail_id))?;
        sqlx::query("DELETE FROM payroll_details WHERE id = ?")
            .bind(detail_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(before)
    }

    async fn finalize_cycle(
        &self,
        cycle_id: u64,
        finalized_by: u64,
        at: DateTime<Utc>,
        check: &FinalizationCheck,
    ) -> StoreResult<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {CYCLE_COLUMNS} FROM payroll_cycles WHERE id = ? FOR UPDATE");
        let mut cycle = sqlx::query_as::<_, PayrollCycle>(&sql)
            .bind(cycle_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PayrollError::cycle_not_found(cycle_id))?;

        if cycle.is_locked() {
            return Ok(FinalizeOutcome::AlreadyCompleted);
        }

        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM payroll_details WHERE payroll_cycle_id = ? ORDER BY employee_id"
        );
        let details = sqlx::query_as::<_, PayrollDetail>(&sql)
            .bind(cycle_id)
            .fetch_all(&mut *tx)
            .await?;

        let issues = check(&details);
        if !issues.is_empty() {
            tx.rollback().await?;
            return Ok(FinalizeOutcome::Blocked(issues));
        }

        let result = sqlx::query(
            r#"
            UPDATE payroll_cycles
            SET status = ?, finalized_at = ?, finalized_by = ?
            WHERE id = ?
            AND status = ?
            "#,
        )
        .bind(CycleStatus::Completed.as_ref())
        .bind(at)
        .bind(finalized_by)
        .bind(cycle_id)
        .bind(CycleStatus::Active.as_ref())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(FinalizeOutcome::AlreadyCompleted);
        }

        tx.commit().await?;

        cycle.status = CycleStatus::Completed;
        cycle.finalized_at = Some(at);
        cycle.finalized_by = Some(finalized_by);
        Ok(FinalizeOutcome::Finalized { cycle, details })
    }
}

#[async_trait]
impl AttendanceSource for MySqlStore {
    async fn intervals_between(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<AttendanceInterval>> {
        let intervals = sqlx::query_as::<_, AttendanceInterval>(
            r#"
            SELECT employee_id, branch_id, check_in_at, check_out_at
            FROM attendance
            WHERE DATE(check_in_at) <= ?
            AND DATE(COALESCE(check_out_at, check_in_at)) >= ?
            ORDER BY employee_id, check_in_at
            "#,
        )
        .bind(end)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;
        Ok(intervals)
    }

    async fn pay_rates(&self, employee_ids: &[u64]) -> StoreResult<HashMap<u64, PayRates>> {
        if employee_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::<MySql>::new("SELECT id, hourly_rate, daily_rate FROM employees WHERE id IN (");
        let mut ids = qb.separated(", ");
        for id in employee_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let rows: Vec<(u64, Option<f64>, Option<f64>)> =
            qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, hourly, daily)| {
                Some((
                    id,
                    PayRates {
                        hourly_rate: hourly?,
                        daily_rate: daily?,
                    },
                ))
            })
            .collect())
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: u64,
    actor_user_id: u64,
    action: String,
    table_name: String,
    record_id: u64,
    old_values: Option<Json<Value>>,
    new_values: Option<Json<Value>>,
    description: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = PayrollError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action: AuditAction = row
            .action
            .parse()
            .map_err(|_| PayrollError::Storage(format!("unknown audit action {:?}", row.action)))?;

        Ok(AuditLogEntry {
            id: row.id,
            actor_user_id: row.actor_user_id,
            action,
            table_name: row.table_name,
            record_id: row.record_id,
            old_values: row.old_values.map(|v| v.0),
            new_values: row.new_values.map(|v| v.0),
            description: row.description,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditStore for MySqlStore {
    async fn insert_audit_log(&self, entry: &NewAuditLog, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
            (actor_user_id, action, table_name, record_id, old_values, new_values,
             description, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.actor_user_id)
        .bind(entry.action.as_ref())
        .bind(&entry.table_name)
        .bind(entry.record_id)
        .bind(entry.old_values.clone().map(Json))
        .bind(entry.new_values.clone().map(Json))
        .bind(&entry.description)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id())
    }

    async fn query_audit_logs(&self, query: &AuditQuery, limit: u32) -> StoreResult<Vec<AuditLogEntry>> {
        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT id, actor_user_id, action, table_name, record_id, old_values, new_values, \
             description, ip_address, user_agent, created_at FROM audit_logs WHERE 1 = 1",
        );
        if let Some(table_name) = &query.table_name {
            qb.push(" AND table_name = ").push_bind(table_name.clone());
        }
        if let Some(record_id) = query.record_id {
            qb.push(" AND record_id = ").push_bind(record_id);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit);

        let rows: Vec<AuditRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::model::attendance::AttendanceInterval;
use crate::error::PayrollError;
use crate::model::payroll_cycle::{NewPayrollCycle, PayrollCycle};
use crate::model::payroll_detail::{Adjustment, PayrollDetail};
use crate::service::adjustment::AdjustmentService;
use crate::service::audit::{AuditContext, AuditTrail};
use crate::service::calculator::RateRule;
use crate::service::finalizer::CycleFinalizer;
use crate::service::payroll::PayrollService;
use crate::store::{DetailChange, FinalizationCheck, FinalizeOutcome, PayrollStore, StoreResult};
use crate::store::memory::MemoryStore;

/// Services wired over one in-memory store.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub audit: AuditTrail,
    pub payroll: PayrollService,
    pub adjustments: AdjustmentService,
    pub finalizer: CycleFinalizer,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_payroll_store(|store| store as Arc<dyn PayrollStore>)
    }

    /// Payroll writes go through `wrap(memory)`; attendance and audit stay on the memory store.
    pub fn with_payroll_store(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn PayrollStore>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let payroll_store = wrap(store.clone());
        let audit = AuditTrail::new(store.clone(), 200);
        Self {
            payroll: PayrollService::new(payroll_store.clone(), store.clone(), audit.clone(), RateRule::default()),
            adjustments: AdjustmentService::new(payroll_store.clone(), audit.clone()),
            finalizer: CycleFinalizer::new(payroll_store, store.clone(), audit.clone()),
            audit,
            store,
        }
    }

    pub fn ctx(&self) -> AuditContext {
        AuditContext {
            actor_user_id: 42,
            ip_address: Some("198.51.100.4".into()),
            user_agent: Some("payroll-tests".into()),
        }
    }

    /// An active 2026-01-01..=2026-01-31 cycle, created without an audit entry.
    pub async fn january(&self) -> PayrollCycle {
        self.store
            .create_cycle(
                &NewPayrollCycle {
                    name: "January 2026".into(),
                    period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    period_end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    pub async fn seed_detail(&self, cycle_id: u64, employee_id: u64, base_pay: f64) -> PayrollDetail {
        self.store
            .upsert_base_pay(cycle_id, employee_id, base_pay, Utc::now())
            .await
            .unwrap()
            .after
    }

    pub fn shift(&self, employee_id: u64, start: &str, hours: f64) {
        let check_in_at = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S").unwrap();
        self.store.add_attendance(AttendanceInterval {
            employee_id,
            branch_id: 1,
            check_in_at,
            check_out_at: Some(check_in_at + Duration::seconds((hours * 3600.0).round() as i64)),
        });
    }
}

/// Memory store with hooks for the failure and interleaving cases a single mutex never produces.
pub struct HookedStore {
    inner: Arc<MemoryStore>,
    upserts: AtomicUsize,
    /// 1-based upsert call that fails with a storage error.
    fail_upsert: Option<usize>,
    /// Actor that completes the cycle just before every finalize reaches the store.
    rival_finalizer: Option<u64>,
}

impl HookedStore {
    fn wrap(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            upserts: AtomicUsize::new(0),
            fail_upsert: None,
            rival_finalizer: None,
        }
    }

    pub fn failing_upsert(inner: Arc<MemoryStore>, nth: usize) -> Arc<dyn PayrollStore> {
        Arc::new(Self {
            fail_upsert: Some(nth),
            ..Self::wrap(inner)
        })
    }

    pub fn with_rival_finalizer(inner: Arc<MemoryStore>, actor_user_id: u64) -> Arc<dyn PayrollStore> {
        Arc::new(Self {
            rival_finalizer: Some(actor_user_id),
            ..Self::wrap(inner)
        })
    }
}

#[async_trait]
impl PayrollStore for HookedStore {
    async fn create_cycle(&self, cycle: &NewPayrollCycle, at: DateTime<Utc>) -> StoreResult<PayrollCycle> {
        self.inner.create_cycle(cycle, at).await
    }

    async fn get_cycle(&self, cycle_id: u64) -> StoreResult<Option<PayrollCycle>> {
        self.inner.get_cycle(cycle_id).await
    }

    async fn list_cycles(&self) -> StoreResult<Vec<PayrollCycle>> {
        self.inner.list_cycles().await
    }

    async fn get_detail(&self, detail_id: u64) -> StoreResult<Option<PayrollDetail>> {
        self.inner.get_detail(detail_id).await
    }

    async fn find_detail(&self, cycle_id: u64, employee_id: u64) -> StoreResult<Option<PayrollDetail>> {
        self.inner.find_detail(cycle_id, employee_id).await
    }

    async fn list_details(&self, cycle_id: u64) -> StoreResult<Vec<PayrollDetail>> {
        self.inner.list_details(cycle_id).await
    }

    async fn upsert_base_pay(
        &self,
        cycle_id: u64,
        employee_id: u64,
        base_pay: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<DetailChange> {
        let call = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upsert == Some(call) {
            return Err(PayrollError::Storage("connection reset".into()));
        }
        self.inner.upsert_base_pay(cycle_id, employee_id, base_pay, at).await
    }

    async fn apply_adjustment(&self, detail_id: u64, adjustment: &Adjustment) -> StoreResult<DetailChange> {
        self.inner.apply_adjustment(detail_id, adjustment).await
    }

    async fn delete_detail(&self, detail_id: u64) -> StoreResult<PayrollDetail> {
        self.inner.delete_detail(detail_id).await
    }

    async fn finalize_cycle(
        &self,
        cycle_id: u64,
        finalized_by: u64,
        at: DateTime<Utc>,
        check: &FinalizationCheck,
    ) -> StoreResult<FinalizeOutcome> {
        if let Some(rival) = self.rival_finalizer {
            self.inner
                .finalize_cycle(cycle_id, rival, at - Duration::seconds(1), check)
                .await?;
        }
        self.inner.finalize_cycle(cycle_id, finalized_by, at, check).await
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::PayrollError;
use crate::model::audit_log::{AuditAction, AuditLogEntry, AuditQuery, NewAuditLog};
use crate::store::AuditStore;

/// Who is making a change, and from where.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditContext {
    pub actor_user_id: u64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn entry(
        &self,
        action: AuditAction,
        table_name: &str,
        record_id: u64,
        old_values: Option<Value>,
        new_values: Option<Value>,
        description: String,
    ) -> NewAuditLog {
        NewAuditLog {
            actor_user_id: self.actor_user_id,
            action,
            table_name: table_name.to_string(),
            record_id,
            old_values,
            new_values,
            description,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuditHealth {
    pub recorded: u64,
    pub failed: u64,
}

/// Append-only change history.
///
/// Writes are best-effort: a failed insert is logged and counted, and the caller's
/// already-committed change stands.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    max_limit: u32,
    recorded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>, max_limit: u32) -> Self {
        Self {
            store,
            max_limit,
            recorded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn record(&self, entry: NewAuditLog) -> bool {
        match self.store.insert_audit_log(&entry, Utc::now()).await {
            Ok(id) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    audit_id = id,
                    action = %entry.action,
                    table = %entry.table_name,
                    record_id = entry.record_id,
                    "Audit entry recorded"
                );
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %e,
                    action = %entry.action,
                    table = %entry.table_name,
                    record_id = entry.record_id,
                    actor_user_id = entry.actor_user_id,
                    "Failed to record audit entry"
                );
                false
            }
        }
    }

    /// Newest first.
    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, PayrollError> {
        let limit = query.effective_limit(self.max_limit);
        self.store.query_audit_logs(query, limit).await
    }

    pub fn health(&self) -> AuditHealth {
        AuditHealth {
            recorded: self.recorded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::audit_log::PAYROLL_DETAILS;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn ctx() -> AuditContext {
        AuditContext {
            actor_user_id: 9,
            ip_address: Some("203.0.113.7".into()),
            user_agent: Some("curl/8.5".into()),
        }
    }

    fn entry(record_id: u64) -> NewAuditLog {
        ctx().entry(
            AuditAction::Update,
            PAYROLL_DETAILS,
            record_id,
            Some(json!({"bonus": 0.0})),
            Some(json!({"bonus": 100.0})),
            format!("Bonus for detail #{record_id} set"),
        )
    }

    #[actix_web::test]
    async fn failed_write_returns_false_and_is_counted() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone(), 200);

        assert!(trail.record(entry(1)).await);
        store.fail_audit_writes(true);
        assert!(!trail.record(entry(2)).await);

        assert_eq!(trail.health(), AuditHealth { recorded: 1, failed: 1 });
        assert_eq!(store.audit_entries().len(), 1);
    }

    #[actix_web::test]
    async fn query_is_newest_first_filtered_and_limited() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone(), 200);
        for id in [1, 2, 1, 3, 1] {
            trail.record(entry(id)).await;
        }

        let all = trail.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.iter().map(|e| e.record_id).collect::<Vec<_>>(), vec![1, 3, 1, 2, 1]);

        let only_one = trail
            .query(&AuditQuery {
                table_name: Some(PAYROLL_DETAILS.into()),
                record_id: Some(1),
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(only_one.len(), 2);
        assert!(only_one[0].id > only_one[1].id);
        assert_eq!(only_one[0].ip_address.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn limit_defaults_to_fifty_and_is_clamped() {
        assert_eq!(AuditQuery::default().effective_limit(200), 50);
        let huge = AuditQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(huge.effective_limit(200), 200);
        let zero = AuditQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_limit(200), 1);
    }
}

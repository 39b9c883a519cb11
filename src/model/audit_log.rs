use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::{IntoParams, ToSchema};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Calculate,
}

/// Audited tables.
pub const PAYROLL_CYCLES: &str = "payroll_cycles";
pub const PAYROLL_DETAILS: &str = "payroll_details";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: u64,
    pub actor_user_id: u64,
    pub action: AuditAction,
    #[schema(example = "payroll_details")]
    pub table_name: String,
    pub record_id: u64,
    #[schema(value_type = Option<Object>)]
    pub old_values: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub new_values: Option<Value>,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An entry before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLog {
    pub actor_user_id: u64,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: u64,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    #[schema(example = "payroll_details")]
    /// Only entries for this table
    pub table_name: Option<String>,
    #[schema(example = 31)]
    /// Only entries for this record id
    pub record_id: Option<u64>,
    #[schema(example = 50)]
    /// Maximum number of entries, newest first (default 50)
    pub limit: Option<u32>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: u32 = 50;

    pub fn effective_limit(&self, max: u32) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, max.max(1))
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Completed,
}

impl TryFrom<String> for CycleStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "name": "January 2026",
    "period_start": "2026-01-01",
    "period_end": "2026-01-31",
    "status": "active",
    "created_at": "2026-01-01T08:00:00Z",
    "finalized_at": null,
    "finalized_by": null
}))]
pub struct PayrollCycle {
    pub id: u64,
    pub name: String,
    pub period_start: NaiveDate,
    /// Inclusive.
    pub period_end: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalized_by: Option<u64>,
}

impl PayrollCycle {
    pub fn is_locked(&self) -> bool {
        self.status == CycleStatus::Completed
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPayrollCycle {
    #[schema(example = "January 2026")]
    pub name: String,
    #[schema(example = "2026-01-01")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-01-31")]
    pub period_end: NaiveDate,
}

impl NewPayrollCycle {
    /// Returns every violated rule, not only the first.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        } else if self.name.trim().chars().count() > 100 {
            errors.push("name must be at most 100 characters".to_string());
        }
        if self.period_start > self.period_end {
            errors.push("period_start cannot be after period_end".to_string());
        }
        errors
    }
}

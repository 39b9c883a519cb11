use std::fmt;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::service::finalizer::ValidationIssue;

/// Every rule an input broke, in the order they were checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<String>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

#[derive(Debug, Display)]
pub enum PayrollError {
    #[display(fmt = "validation failed: {}", _0)]
    Validation(ValidationErrors),

    #[display(fmt = "payroll cycle {} is completed and locked", _0)]
    CycleLocked(u64),

    #[display(fmt = "payroll cycle {} has already been finalized", _0)]
    AlreadyFinalized(u64),

    #[display(fmt = "payroll cycle {} did not pass validation", cycle_id)]
    FinalizationBlocked {
        cycle_id: u64,
        issues: Vec<ValidationIssue>,
    },

    #[display(fmt = "{} {} not found", entity, id)]
    NotFound { entity: &'static str, id: u64 },

    #[display(fmt = "storage failure: {}", _0)]
    Storage(String),
}

impl std::error::Error for PayrollError {}

impl PayrollError {
    pub fn validation(errors: Vec<String>) -> Self {
        PayrollError::Validation(ValidationErrors(errors))
    }

    pub fn cycle_not_found(id: u64) -> Self {
        PayrollError::NotFound { entity: "payroll cycle", id }
    }

    pub fn detail_not_found(id: u64) -> Self {
        PayrollError::NotFound { entity: "payroll detail", id }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PayrollError::Validation(_) => "validation_error",
            PayrollError::CycleLocked(_) => "cycle_locked",
            PayrollError::AlreadyFinalized(_) => "already_finalized",
            PayrollError::FinalizationBlocked { .. } => "finalization_blocked",
            PayrollError::NotFound { .. } => "not_found",
            PayrollError::Storage(_) => "storage_error",
        }
    }
}

impl From<sqlx::Error> for PayrollError {
    fn from(e: sqlx::Error) -> Self {
        PayrollError::Storage(e.to_string())
    }
}

impl ResponseError for PayrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PayrollError::Validation(_) => StatusCode::BAD_REQUEST,
            PayrollError::CycleLocked(_)
            | PayrollError::AlreadyFinalized(_)
            | PayrollError::FinalizationBlocked { .. } => StatusCode::CONFLICT,
            PayrollError::NotFound { .. } => StatusCode::NOT_FOUND,
            PayrollError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            PayrollError::Validation(errors) => json!({
                "error": "Validation failed",
                "code": self.code(),
                "details": errors.0,
            }),
            PayrollError::FinalizationBlocked { issues, .. } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "issues": issues,
            }),
            PayrollError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                json!({
                    "error": "Internal Server Error",
                    "code": self.code(),
                })
            }
            _ => json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

use actix_web::{HttpRequest, HttpResponse, web};
use crate::service::adjustment::AdjustmentPreview;
use crate::model::payroll_detail::PayrollDetail;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::audit_context;
use crate::auth::auth::AuthUser;
use crate::service::adjustment::{AdjustmentProposal, AdjustmentService};
use crate::service::payroll::PayrollService;

#[derive(Deserialize, ToSchema)]
pub struct SetBonus {
    #[schema(example = 3000.0)]
    pub bonus: f64,

    /// Required when `bonus` is above zero.
    #[schema(example = "Exceptional quarter")]
    pub bonus_reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetDeduction {
    #[schema(example = 1500.0)]
    pub deduction: f64,

    /// Required when `deduction` is above zero.
    #[schema(example = "Unpaid leave, 2 days")]
    pub deduction_reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetOvertime {
    #[schema(example = 6.5)]
    pub overtime_hours: f64,

    #[schema(example = 75.0)]
    pub overtime_rate: f64,
}

#[utoipa::path(
    get,
    path = "/api/payroll-details/{detail_id}",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    responses(
        (status = 200, description = "Payroll detail", body = PayrollDetail),
        (status = 404, description = "Detail not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn get_detail(
    auth: AuthUser,
    path: web::Path<u64>,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(payroll.get_detail(path.into_inner()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/payroll-details/{detail_id}",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    responses(
        (status = 200, description = "Detail removed; the deleted row is returned", body = PayrollDetail),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn delete_detail(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let deleted = payroll
        .delete_detail(path.into_inner(), &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(deleted))
}

#[utoipa::path(
    put,
    path = "/api/payroll-details/{detail_id}/bonus",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    request_body(
        content = SetBonus,
        description = "New bonus amount and its reason",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Bonus applied, net pay recomputed", body = PayrollDetail),
        (status = 400, description = "Invalid amount or missing reason", body = Object, example = json!({
            "error": "Validation failed",
            "code": "validation_error",
            "details": ["bonus_reason is required when bonus is greater than zero"]
        })),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn set_bonus(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
    payload: web::Json<SetBonus>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let SetBonus { bonus, bonus_reason } = payload.into_inner();
    let detail = adjustments
        .set_bonus(path.into_inner(), bonus, bonus_reason, &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/payroll-details/{detail_id}/bonus",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    responses(
        (status = 200, description = "Bonus cleared", body = PayrollDetail),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn clear_bonus(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let detail = adjustments
        .clear_bonus(path.into_inner(), &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    put,
    path = "/api/payroll-details/{detail_id}/deduction",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    request_body(
        content = SetDeduction,
        description = "New deduction amount and its reason",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Deduction applied, net pay recomputed", body = PayrollDetail),
        (status = 400, description = "Invalid amount or missing reason"),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn set_deduction(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
    payload: web::Json<SetDeduction>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let SetDeduction {
        deduction,
        deduction_reason,
    } = payload.into_inner();
    let detail = adjustments
        .set_deduction(
            path.into_inner(),
            deduction,
            deduction_reason,
            &audit_context(&auth, &req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/payroll-details/{detail_id}/deduction",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    responses(
        (status = 200, description = "Deduction cleared", body = PayrollDetail),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn clear_deduction(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let detail = adjustments
        .clear_deduction(path.into_inner(), &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    put,
    path = "/api/payroll-details/{detail_id}/overtime",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    request_body(
        content = SetOvertime,
        description = "Manually entered overtime hours and rate",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Overtime applied, net pay recomputed", body = PayrollDetail),
        (status = 400, description = "Negative or non-finite hours or rate"),
        (status = 404, description = "Detail not found"),
        (status = 409, description = "Cycle is completed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn set_overtime(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
    payload: web::Json<SetOvertime>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let detail = adjustments
        .set_overtime(
            path.into_inner(),
            payload.overtime_hours,
            payload.overtime_rate,
            &audit_context(&auth, &req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/payroll-details/{detail_id}/adjustments/preview",
    params(
        ("detail_id" = u64, Path, description = "Payroll detail ID")
    ),
    request_body(
        content = AdjustmentProposal,
        description = "Proposed bonus and/or deduction; nothing is saved",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Change summary for the proposed values", body = AdjustmentPreview),
        (status = 404, description = "Detail not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Detail"
)]
pub async fn preview_adjustment(
    auth: AuthUser,
    path: web::Path<u64>,
    adjustments: web::Data<AdjustmentService>,
    payload: web::Json<AdjustmentProposal>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(adjustments.preview(path.into_inner(), &payload).await?))
}

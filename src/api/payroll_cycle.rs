use actix_web::{HttpRequest, HttpResponse, web};
use crate::service::payroll::CalculationReport;
use crate::service::finalizer::FinalizationSummary;
use crate::service::finalizer::CycleSummary;
use crate::model::payroll_detail::PayrollDetail;
use crate::model::payroll_cycle::PayrollCycle;

use crate::api::audit_context;
use crate::auth::auth::AuthUser;
use crate::model::payroll_cycle::NewPayrollCycle;
use crate::service::finalizer::CycleFinalizer;
use crate::service::payroll::PayrollService;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/api/payroll-cycles",
    request_body(
        content = NewPayrollCycle,
        description = "Name and inclusive period of the new cycle",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Cycle created", body = PayrollCycle),
        (status = 400, description = "Blank name or period_start after period_end", body = Object, example = json!({
            "error": "Validation failed",
            "code": "validation_error",
            "details": ["period_start cannot be after period_end"]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
pub async fn create_cycle(
    auth: AuthUser,
    req: HttpRequest,
    payroll: web::Data<PayrollService>,
    payload: web::Json<NewPayrollCycle>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let cycle = payroll
        .create_cycle(&payload, &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Created().json(cycle))
}

#[utoipa::path(
    get,
    path = "/api/payroll-cycles",
    responses(
        (status = 200, description = "All cycles, newest period first", body = [PayrollCycle]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
pub async fn list_cycles(
    auth: AuthUser,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(payroll.list_cycles().await?))
}

#[utoipa::path(
    get,
    path = "/api/payroll-cycles/{cycle_id}",
    params(
        ("cycle_id" = u64, Path, description = "Payroll cycle ID")
    ),
    responses(
        (status = 200, description = "Payroll cycle", body = PayrollCycle),
        (status = 404, description = "Cycle not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
pub async fn get_cycle(
    auth: AuthUser,
    path: web::Path<u64>,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(payroll.get_cycle(path.into_inner()).await?))
}

#[utoipa::path(
    get,
    path = "/api/payroll-cycles/{cycle_id}/details",
    params(
        ("cycle_id" = u64, Path, description = "Payroll cycle ID")
    ),
    responses(
        (status = 200, description = "Every payroll detail of the cycle", body = [PayrollDetail]),
        (status = 404, description = "Cycle not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
pub async fn list_details(
    auth: AuthUser,
    path: web::Path<u64>,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(payroll.list_details(path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/payroll-cycles/{cycle_id}/calculate",
    params(
        ("cycle_id" = u64, Path, description = "Payroll cycle ID")
    ),
    responses(
        (status = 200, description = "Base pay recomputed from attendance", body = CalculationReport),
        (status = 404, description = "Cycle not found"),
        (status = 409, description = "Cycle is completed", body = Object, example = json!({
            "error": "payroll cycle 7 is completed and locked",
            "code": "cycle_locked"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
#[instrument(
    name = "payroll_calculate",
    skip_all,
    fields(cycle_id = *path, actor_user_id = auth.user_id)
)]
pub async fn calculate(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    payroll: web::Data<PayrollService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let report = payroll
        .calculate(path.into_inner(), &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/payroll-cycles/{cycle_id}/summary",
    params(
        ("cycle_id" = u64, Path, description = "Payroll cycle ID")
    ),
    responses(
        (status = 200, description = "Finalization readiness and totals", body = CycleSummary),
        (status = 404, description = "Cycle not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
pub async fn summary(
    auth: AuthUser,
    path: web::Path<u64>,
    finalizer: web::Data<CycleFinalizer>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(finalizer.summary(path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/payroll-cycles/{cycle_id}/finalize",
    params(
        ("cycle_id" = u64, Path, description = "Payroll cycle ID")
    ),
    responses(
        (status = 200, description = "Cycle completed and locked", body = FinalizationSummary),
        (status = 404, description = "Cycle not found"),
        (status = 409, description = "Already finalized, or validation failed at commit time", body = Object, example = json!({
            "error": "payroll cycle 7 did not pass validation",
            "code": "finalization_blocked",
            "issues": [{
                "kind": "missing_data",
                "employee_id": 1002,
                "detail_id": null,
                "amount": null,
                "message": "Employee #1002 has attendance but no payroll detail"
            }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll Cycle"
)]
#[instrument(
    name = "payroll_finalize",
    skip_all,
    fields(cycle_id = *path, actor_user_id = auth.user_id)
)]
pub async fn finalize(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    finalizer: web::Data<CycleFinalizer>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let summary = finalizer
        .finalize(path.into_inner(), &audit_context(&auth, &req))
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

use actix_web::{HttpResponse, web};
use crate::service::audit::AuditHealth;
use crate::model::audit_log::AuditLogEntry;

use crate::auth::auth::AuthUser;
use crate::model::audit_log::AuditQuery;
use crate::service::audit::AuditTrail;

#[utoipa::path(
    get,
    path = "/api/audit-logs",
    params(AuditQuery),
    responses(
        (status = 200, description = "Matching audit entries, newest first", body = [AuditLogEntry]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Audit"
)]
pub async fn list_audit_logs(
    auth: AuthUser,
    query: web::Query<AuditQuery>,
    audit: web::Data<AuditTrail>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(audit.query(&query).await?))
}

#[utoipa::path(
    get,
    path = "/api/audit-logs/status",
    responses(
        (status = 200, description = "Audit writes recorded and failed since start-up", body = AuditHealth),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Audit"
)]
pub async fn audit_status(auth: AuthUser, audit: web::Data<AuditTrail>) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(audit.health()))
}

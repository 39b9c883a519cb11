use crate::auth::auth::{AuthUser, unauthorized};
use crate::auth::jwt::verify_access_token;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

/// Resolves the bearer token on `req` to a caller, or the reason it was refused.
fn authenticate(req: &ServiceRequest, secret: &str) -> Result<AuthUser, &'static str> {
    let header_value = req
        .headers()
        .get("Authorization")
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header encoding")?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must start with Bearer")?;

    let claims = verify_access_token(token, secret).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        "Invalid or expired token"
    })?;

    let role = Role::from_id(claims.role).ok_or("Invalid role")?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let auth_user = match authenticate(&req, &config.jwt_secret) {
        Ok(user) => user,
        Err(message) => {
            tracing::debug!(path = %req.path(), reason = message, "Unauthenticated request");
            return Ok(req.into_response(unauthorized(message).map_into_boxed_body()));
        }
    };

    tracing::debug!(
        user_id = auth_user.user_id,
        path = %req.path(),
        "Authenticated request"
    );
    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

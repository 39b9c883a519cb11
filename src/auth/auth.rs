use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, HttpResponse, dev::Payload, error::InternalError};
use futures::future::{Ready, ready};
use serde_json::json;

/// The caller, as established by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

/// 401 in the same `{error, code}` shape as every other API error.
pub fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "error": message, "code": "unauthorized" }))
}

pub fn forbidden(message: &str) -> HttpResponse {
    HttpResponse::Forbidden().json(json!({ "error": message, "code": "forbidden" }))
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<AuthUser>().cloned().ok_or_else(|| {
            InternalError::from_response("Missing token", unauthorized("Missing token")).into()
        }))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role.is_elevated() {
            Ok(())
        } else {
            Err(InternalError::from_response("Admin only", forbidden("Admin only")).into())
        }
    }
}

pub mod audit_log;
pub mod payroll_cycle;
pub mod payroll_detail;

use std::net::IpAddr;

use actix_web::{HttpRequest, web};

use crate::auth::auth::AuthUser;
use crate::error::PayrollError;
use crate::service::audit::AuditContext;

/// Longest user agent kept on an audit row.
pub const MAX_USER_AGENT_CHARS: usize = 512;

/// Malformed or mistyped JSON bodies get the same 400 shape as rule violations.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        tracing::debug!(error = %err, "Rejected JSON body");
        PayrollError::validation(vec![err.to_string()]).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| PayrollError::validation(vec![err.to_string()]).into())
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_ip(value: &str) -> Option<String> {
    value.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`. Values that are not IP addresses are dropped.
pub fn client_ip(req: &HttpRequest) -> Option<String> {
    header(req, "X-Forwarded-For")
        .and_then(|v| v.split(',').next())
        .and_then(parse_ip)
        .or_else(|| header(req, "X-Real-IP").and_then(parse_ip))
}

pub fn audit_context(auth: &AuthUser, req: &HttpRequest) -> AuditContext {
    AuditContext {
        actor_user_id: auth.user_id,
        ip_address: client_ip(req),
        user_agent: header(req, "User-Agent")
            .map(|ua| ua.chars().take(MAX_USER_AGENT_CHARS).collect()),
    }
}

use crate::{
    api::{audit_log, payroll_cycle, payroll_detail},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiter allowing `requests_per_min` with an equal burst.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiter: Limiter) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiter) // rate limiting
            .configure(api_routes),
    );
}

pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payroll-cycles")
            // /payroll-cycles
            .service(
                web::resource("")
                    .route(web::post().to(payroll_cycle::create_cycle))
                    .route(web::get().to(payroll_cycle::list_cycles)),
            )
            // /payroll-cycles/{id}
            .service(web::resource("/{id}").route(web::get().to(payroll_cycle::get_cycle)))
            .service(
                web::resource("/{id}/details").route(web::get().to(payroll_cycle::list_details)),
            )
            .service(
                web::resource("/{id}/calculate").route(web::post().to(payroll_cycle::calculate)),
            )
            .service(web::resource("/{id}/summary").route(web::get().to(payroll_cycle::summary)))
            .service(
                web::resource("/{id}/finalize").route(web::post().to(payroll_cycle::finalize)),
            ),
    )
    .service(
        web::scope("/payroll-details")
            // /payroll-details/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(payroll_detail::get_detail))
                    .route(web::delete().to(payroll_detail::delete_detail)),
            )
            .service(
                web::resource("/{id}/bonus")
                    .route(web::put().to(payroll_detail::set_bonus))
                    .route(web::delete().to(payroll_detail::clear_bonus)),
            )
            .service(
                web::resource("/{id}/deduction")
                    .route(web::put().to(payroll_detail::set_deduction))
                    .route(web::delete().to(payroll_detail::clear_deduction)),
            )
            .service(
                web::resource("/{id}/overtime").route(web::put().to(payroll_detail::set_overtime)),
            )
            .service(
                web::resource("/{id}/adjustments/preview")
                    .route(web::post().to(payroll_detail::preview_adjustment)),
            ),
    )
    .service(
        web::scope("/audit-logs")
            .service(web::resource("").route(web::get().to(audit_log::list_audit_logs)))
            .service(web::resource("/status").route(web::get().to(audit_log::audit_status))),
    );
}

use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::service::adjustment::AdjustmentService;
use crate::service::audit::AuditTrail;
use crate::service::calculator::RateRule;
use crate::service::finalizer::CycleFinalizer;
use crate::service::payroll::PayrollService;
use crate::store::mysql::MySqlStore;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Payroll engine is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "payroll.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.run_migrations).await?;
    let store = Arc::new(MySqlStore::new(pool));

    let audit = AuditTrail::new(store.clone(), config.audit_query_max_limit);
    let rule = RateRule {
        daily_threshold_hours: config.daily_rate_threshold_hours,
    };
    let payroll = Data::new(PayrollService::new(store.clone(), store.clone(), audit.clone(), rule));
    let adjustments = Data::new(AdjustmentService::new(store.clone(), audit.clone()));
    let finalizer = Data::new(CycleFinalizer::new(store.clone(), store.clone(), audit.clone()));
    let audit = Data::new(audit);

    let limiter = routes::build_limiter(config.rate_protected_per_min)?;
    let server_addr = config.server_addr.clone();

    info!(addr = %server_addr, prefix = %config.api_prefix, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard matches the JS/CSS assets
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(api::json_config())
            .app_data(api::query_config())
            .app_data(payroll.clone())
            .app_data(adjustments.clone())
            .app_data(finalizer.clone())
            .app_data(audit.clone())
            .service(index)
            // Protected payroll routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config, limiter.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}

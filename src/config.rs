use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    /// Intervals longer than this are paid the flat daily rate.
    pub daily_rate_threshold_hours: f64,
    pub audit_query_max_limit: u32,

    pub log_dir: String,
    pub run_migrations: bool,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let daily_rate_threshold_hours: f64 = parsed_or("DAILY_RATE_THRESHOLD_HOURS", 12.0)?;
        if !daily_rate_threshold_hours.is_finite() || daily_rate_threshold_hours <= 0.0 {
            anyhow::bail!("DAILY_RATE_THRESHOLD_HOURS must be a positive number");
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,
            daily_rate_threshold_hours,
            audit_query_max_limit: parsed_or("AUDIT_QUERY_MAX_LIMIT", 200)?,
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            run_migrations: parsed_or("RUN_MIGRATIONS", false)?,
        })
    }
}

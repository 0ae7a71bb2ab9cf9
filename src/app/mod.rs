mod config;
mod error;
mod logging;
pub mod relay;
mod runtime;
pub mod services;
pub mod simulation;
pub mod telemetry;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        http_bind = %config.http_bind,
        db_path = %config.db_path,
        command_cache_ttl_secs = config.command_cache_ttl_secs,
        command_cache_capacity = config.command_cache_capacity,
        simulation_tick_ms = config.simulation_tick_ms,
        rate_per_kwh = config.rate_per_kwh,
        payments_configured = config.razorpay.is_some(),
        "application bootstrap initialized"
    );

    runtime::run(config)
}

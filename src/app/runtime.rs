use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::command_cache::InMemoryCommandCache;
use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::payment::RazorpayClient;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::relay::CommandRelay;
use crate::app::services::SqliteGateway;
use crate::app::simulation::{SimulationRegistry, start_ticker};
use crate::app::telemetry::TelemetryIngest;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::simulator::SimulationProfile;

const SIMPLE_COMMAND_CAPACITY: usize = 1;

pub fn run(config: AppConfig) -> Result<(), AppError> {
    if let Some(parent) = std::path::Path::new(&config.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(AppError::database_init)?;
    }

    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shared_connection = Arc::new(Mutex::new(connection));
    let gateway = Arc::new(SqliteGateway::new(
        Arc::clone(&shared_connection),
        Arc::clone(&clock),
    ));

    let cache_ttl_ms = i64::try_from(config.command_cache_ttl_secs.saturating_mul(1000))
        .map_err(|_| AppError::config("COMMAND_CACHE_TTL_SECS is too large"))?;
    let command_cache = Arc::new(InMemoryCommandCache::new(
        cache_ttl_ms,
        config.command_cache_capacity,
        Arc::clone(&clock),
    ));
    let simple_cache = Arc::new(InMemoryCommandCache::new(
        cache_ttl_ms,
        SIMPLE_COMMAND_CAPACITY,
        Arc::clone(&clock),
    ));

    let simulations = Arc::new(SimulationRegistry::new(SimulationProfile {
        rate_per_kwh: config.rate_per_kwh,
        ..SimulationProfile::default()
    }));

    let payments = RazorpayClient::new(&config.razorpay_api_base, config.razorpay.clone())
        .map_err(AppError::runtime)?;
    if !payments.is_configured() {
        tracing::warn!("payment gateway credentials not set; order creation will fail");
    }

    let api_state = ApiState {
        gateway: gateway.clone(),
        relay: CommandRelay::new(
            gateway.clone(),
            command_cache.clone(),
            simple_cache,
            Arc::clone(&simulations),
            Arc::clone(&clock),
        ),
        telemetry: TelemetryIngest::new(
            gateway,
            command_cache,
            Arc::clone(&simulations),
            Arc::clone(&clock),
        ),
        simulations: Arc::clone(&simulations),
        payments,
        clock,
        stop_charging_delay: Duration::from_millis(config.stop_charging_delay_ms),
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    let ticker_handle = start_ticker(
        simulations,
        Duration::from_millis(config.simulation_tick_ms),
        Arc::clone(&stop_flag),
    );

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    stop_flag.store(true, Ordering::Relaxed);
    if ticker_handle.join().is_err() {
        return Err(AppError::runtime("simulation ticker thread panicked"));
    }

    tracing::info!("http server stopped");
    server_result.map_err(AppError::runtime)
}

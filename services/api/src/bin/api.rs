//! services/api/src/bin/api.rs

use axum::http::HeaderValue;
use smoker_api::{
    adapters::{identity::auth_state_channel, DbAdapter, HttpTelemetryAdapter},
    config::Config,
    error::ApiError,
    web::{self, app_routes, state::AppState},
};
use smoker_core::{
    watch_auth_state, RoleCache, RouteGuard, SensorConfig, SensorManager, SessionRecorder,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let telemetry = Arc::new(HttpTelemetryAdapter::new(
        config.telemetry_url.clone(),
        config.telemetry_timeout,
    )?);
    if config.telemetry_url.is_none() {
        info!("TELEMETRY_URL is not set; sensor readings will be simulated.");
    }

    // --- 4. Access Control ---
    let role_cache = Arc::new(RoleCache::new());
    let auth_state = auth_state_channel();
    let cache_listener = watch_auth_state(role_cache.clone(), auth_state.subscribe());
    let guard = Arc::new(RouteGuard::new(
        role_cache.clone(),
        db_adapter.clone(),
        config.guard_failure_policy,
    ));

    // --- 5. Sensors ---
    let sensors = SensorManager::new(db_adapter.clone(), telemetry);
    for (sensor_id, sensor_type) in &config.sensors {
        sensors.register(sensor_id.clone(), sensor_type.clone(), SensorConfig::new());
        let id = sensor_id.clone();
        sensors.on_update(sensor_id.clone(), move |value, timestamp| {
            debug!(sensor_id = %id, value, %timestamp, "Sensor reading updated");
        });
    }
    sensors.start_polling(config.poll_interval);
    info!(
        sensors = config.sensors.len(),
        interval_ms = config.poll_interval.as_millis() as u64,
        "Sensor polling started."
    );

    // --- 6. Build the Shared AppState ---
    let sessions = SessionRecorder::new(db_adapter.clone());
    let app_state = Arc::new(AppState {
        store: db_adapter.clone(),
        accounts: db_adapter,
        routes: Arc::new(app_routes()),
        role_cache,
        guard,
        sensors: sensors.clone(),
        sessions,
        auth_state,
    });

    // --- 7. Create the Web Router ---
    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let app = web::router(app_state, Some(cors_origin));

    // --- 8. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 9. Tear Down ---
    sensors.stop_polling();
    cache_listener.abort();
    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received.");
}

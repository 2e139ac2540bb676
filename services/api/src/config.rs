//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use smoker_core::{GuardFailurePolicy, SensorType, DEFAULT_POLL_INTERVAL};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub telemetry_url: Option<String>,
    pub telemetry_timeout: Duration,
    pub poll_interval: Duration,
    pub sensors: Vec<(String, SensorType)>,
    pub guard_failure_policy: GuardFailurePolicy,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Telemetry Settings ---
        // Without an endpoint every poll falls back to simulated readings.
        let telemetry_url = std::env::var("TELEMETRY_URL").ok().filter(|url| !url.is_empty());
        let telemetry_timeout = millis_var("TELEMETRY_TIMEOUT_MS", DEFAULT_TELEMETRY_TIMEOUT)?;
        let poll_interval = millis_var("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?;
        let sensors = parse_sensors(
            &std::env::var("SENSORS")
                .unwrap_or_else(|_| "temperature-1:temperature,smoke-1:smokeLevel".to_string()),
        )?;

        // --- Load Access Settings ---
        let guard_failure_policy = parse_failure_policy(
            &std::env::var("GUARD_FAILURE_POLICY").unwrap_or_else(|_| "open".to_string()),
        )?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            telemetry_url,
            telemetry_timeout,
            poll_interval,
            sensors,
            guard_failure_policy,
            cors_origin,
        })
    }
}

const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Sensor ids that would collide with a static route under `/{dashboard}/sensors/`.
const RESERVED_SENSOR_IDS: &[&str] = &["latest"];

fn millis_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    name.to_string(),
                    format!("'{}' is not a positive number of milliseconds", value),
                )
            }),
        Err(_) => Ok(default),
    }
}

/// Parses `id:type` pairs separated by commas, e.g. `pit:temperature,stack:smokeLevel`.
/// Ids must be a single path segment and may not be `latest`.
pub fn parse_sensors(value: &str) -> Result<Vec<(String, SensorType)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((id, _)) if RESERVED_SENSOR_IDS.contains(&id.trim()) || id.contains('/') => {
                Err(ConfigError::InvalidValue(
                    "SENSORS".to_string(),
                    format!("'{}' is not a usable sensor id", id.trim()),
                ))
            }
            Some((id, kind)) if !id.trim().is_empty() && !kind.trim().is_empty() => {
                Ok((id.trim().to_string(), SensorType::from(kind.trim())))
            }
            _ => Err(ConfigError::InvalidValue(
                "SENSORS".to_string(),
                format!("'{}' is not an id:type pair", entry),
            )),
        })
        .collect()
}

pub fn parse_failure_policy(value: &str) -> Result<GuardFailurePolicy, ConfigError> {
    match value.to_lowercase().as_str() {
        "open" => Ok(GuardFailurePolicy::FailOpen),
        "closed" => Ok(GuardFailurePolicy::FailClosed),
        _ => Err(ConfigError::InvalidValue(
            "GUARD_FAILURE_POLICY".to_string(),
            format!("'{}' must be 'open' or 'closed'", value),
        )),
    }
}

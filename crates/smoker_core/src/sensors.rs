//! crates/smoker_core/src/sensors.rs
//!
//! The sensor registry and poller. A `SensorManager` is created by the
//! composition root, owns every registered sensor descriptor, appends each
//! accepted reading to the `sensorReadings` collection and notifies the
//! sensor's observer. Polling asks the telemetry endpoint for fresh values on
//! a fixed interval and simulates readings whenever the endpoint is down.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    strip_reserved, LatestSensorData, NewSensorReading, SensorConfig, SensorDescriptor,
    SensorHistory, SensorReading, SensorType, READING_FIELDS,
};
use crate::ports::{DocumentStore, TelemetrySource};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// How far back the dashboard aggregate looks, and how many points per series it keeps.
const LATEST_WINDOW_HOURS: i64 = 24;
const LATEST_SERIES_LIMIT: usize = 20;

/// Called with `(value, timestamp)` after every accepted reading.
pub type ReadingObserver = Arc<dyn Fn(f64, DateTime<Utc>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    sensors: HashMap<String, SensorDescriptor>,
    observers: HashMap<String, ReadingObserver>,
}

pub struct SensorManager {
    registry: Mutex<Registry>,
    store: Arc<dyn DocumentStore>,
    telemetry: Arc<dyn TelemetrySource>,
    poller: Mutex<Option<CancellationToken>>,
    last_fetch_time: Mutex<Option<DateTime<Utc>>>,
}

impl SensorManager {
    pub fn new(store: Arc<dyn DocumentStore>, telemetry: Arc<dyn TelemetrySource>) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            store,
            telemetry,
            poller: Mutex::new(None),
            last_fetch_time: Mutex::new(None),
        })
    }

    //=====================================================================================
    // Registration
    //=====================================================================================

    /// Inserts or replaces a sensor. Any previous reading is forgotten. Config
    /// keys named like a reading field are dropped.
    pub fn register(&self, sensor_id: impl Into<String>, sensor_type: SensorType, mut config: SensorConfig) {
        let sensor_id = sensor_id.into();
        info!(%sensor_id, %sensor_type, "Registering sensor");
        let dropped = strip_reserved(&mut config, READING_FIELDS);
        if !dropped.is_empty() {
            warn!(%sensor_id, ?dropped, "Ignoring config keys that shadow reading fields");
        }
        self.registry.lock().sensors.insert(
            sensor_id,
            SensorDescriptor {
                sensor_type,
                config,
                last_reading: None,
                last_update: None,
            },
        );
    }

    /// Removes the sensor together with its observer.
    pub fn unregister(&self, sensor_id: &str) {
        let mut registry = self.registry.lock();
        registry.sensors.remove(sensor_id);
        registry.observers.remove(sensor_id);
    }

    /// Sets the observer for `sensor_id`, replacing any previous one.
    pub fn on_update<F>(&self, sensor_id: impl Into<String>, observer: F)
    where
        F: Fn(f64, DateTime<Utc>) + Send + Sync + 'static,
    {
        self.registry
            .lock()
            .observers
            .insert(sensor_id.into(), Arc::new(observer));
    }

    pub fn remove_update_callback(&self, sensor_id: &str) {
        self.registry.lock().observers.remove(sensor_id);
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<SensorDescriptor> {
        self.registry.lock().sensors.get(sensor_id).cloned()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().sensors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn latest_reading(&self, sensor_id: &str) -> Option<f64> {
        self.registry
            .lock()
            .sensors
            .get(sensor_id)
            .and_then(|sensor| sensor.last_reading)
    }

    //=====================================================================================
    // Readings
    //=====================================================================================

    /// Records a new value for `sensor_id`. Unknown sensors are logged and ignored.
    /// A failed write to the store is logged; the observer is notified regardless.
    pub async fn update_reading(&self, sensor_id: &str, value: f64) {
        let timestamp = Utc::now();
        let reading = {
            let mut registry = self.registry.lock();
            let Some(sensor) = registry.sensors.get_mut(sensor_id) else {
                error!(%sensor_id, "Sensor not found");
                return;
            };
            sensor.last_reading = Some(value);
            sensor.last_update = Some(timestamp);
            NewSensorReading {
                sensor_id: sensor_id.to_string(),
                sensor_type: sensor.sensor_type.clone(),
                value,
                timestamp,
                config: sensor.config.clone(),
            }
        };

        if let Err(e) = self.store.append_reading(reading).await {
            error!(%sensor_id, "Error storing sensor reading: {:?}", e);
        }

        let observer = self.registry.lock().observers.get(sensor_id).cloned();
        if let Some(observer) = observer {
            observer(value, timestamp);
        }
    }

    /// The dashboard aggregate: the last 20 temperature and smoke-level readings
    /// of the past 24 hours in chronological order, plus the newest value of each
    /// series (0 when empty). Returns `None` if the store cannot be queried.
    pub async fn latest_sensor_data(&self) -> Option<LatestSensorData> {
        let now = Utc::now();
        let since = now - ChronoDuration::hours(LATEST_WINDOW_HOURS);

        let result = tokio::try_join!(
            self.store
                .recent_readings(&SensorType::Temperature, since, LATEST_SERIES_LIMIT),
            self.store
                .recent_readings(&SensorType::SmokeLevel, since, LATEST_SERIES_LIMIT),
        );
        let (mut temperature, mut smoke_level) = match result {
            Ok(series) => series,
            Err(e) => {
                error!("Error fetching latest sensor data: {:?}", e);
                return None;
            }
        };
        temperature.reverse();
        smoke_level.reverse();

        *self.last_fetch_time.lock() = Some(now);
        Some(LatestSensorData {
            temperature: temperature.last().map_or(0.0, |point| point.value),
            smoke_level: smoke_level.last().map_or(0.0, |point| point.value),
            timestamp: now,
            history: SensorHistory {
                temperature,
                smoke_level,
            },
        })
    }

    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        *self.last_fetch_time.lock()
    }

    /// Persisted readings of one sensor within `[start, end]`, oldest first.
    /// Query failures are logged and yield an empty history.
    pub async fn sensor_history(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SensorReading> {
        match self.store.readings_for_sensor(sensor_id, start, end).await {
            Ok(readings) => readings,
            Err(e) => {
                error!(%sensor_id, "Error fetching sensor history: {:?}", e);
                Vec::new()
            }
        }
    }

    //=====================================================================================
    // Polling
    //=====================================================================================

    /// Starts the acquisition timer, replacing any running one. Each tick runs as
    /// its own task, so a slow tick does not delay the next one. A zero period
    /// is refused and leaves any running timer untouched.
    pub fn start_polling(self: &Arc<Self>, period: Duration) {
        if period.is_zero() {
            error!("Refusing to poll sensors with a zero interval");
            return;
        }
        let token = CancellationToken::new();
        if let Some(previous) = self.poller.lock().replace(token.clone()) {
            previous.cancel();
        }
        info!(period_ms = period.as_millis() as u64, "Starting sensor polling");

        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        tokio::spawn(async move { manager.poll_once().await });
                    }
                }
            }
            debug!("Sensor polling loop exited.");
        });
    }

    /// Cancels the acquisition timer. Ticks already in flight still complete.
    pub fn stop_polling(&self) {
        if let Some(token) = self.poller.lock().take() {
            info!("Stopping sensor polling");
            token.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    /// One acquisition cycle: read the telemetry endpoint and route each
    /// registered sensor's field through `update_reading`, or simulate a reading
    /// for every sensor when the endpoint fails.
    pub async fn poll_once(&self) {
        match self.telemetry.fetch().await {
            Ok(payload) => {
                let updates: Vec<(String, f64)> = self
                    .registered_types()
                    .into_iter()
                    .filter_map(|(sensor_id, sensor_type)| {
                        let field = payload.get(sensor_type.field_name())?;
                        match field.as_f64() {
                            Some(value) => Some((sensor_id, value)),
                            None => {
                                warn!(%sensor_id, %field, "Ignoring non-numeric telemetry value");
                                None
                            }
                        }
                    })
                    .collect();
                join_all(
                    updates
                        .iter()
                        .map(|(sensor_id, value)| self.update_reading(sensor_id, *value)),
                )
                .await;
            }
            Err(e) => {
                warn!("Error fetching real sensor data, simulating readings: {:?}", e);
                let updates: Vec<(String, f64)> = self
                    .registered_types()
                    .into_iter()
                    .map(|(sensor_id, sensor_type)| (sensor_id, simulate_reading(&sensor_type)))
                    .collect();
                join_all(
                    updates
                        .iter()
                        .map(|(sensor_id, value)| self.update_reading(sensor_id, *value)),
                )
                .await;
            }
        }
    }

    fn registered_types(&self) -> Vec<(String, SensorType)> {
        self.registry
            .lock()
            .sensors
            .iter()
            .map(|(id, sensor)| (id.clone(), sensor.sensor_type.clone()))
            .collect()
    }
}

/// A uniformly distributed stand-in reading in `[0, ceiling)` for the sensor's type.
pub fn simulate_reading(sensor_type: &SensorType) -> f64 {
    rand::thread_rng().gen_range(0.0..sensor_type.simulation_ceiling())
}

//! crates/smoker_core/src/domain.rs
//!
//! Defines the core data structures for the smoker monitor: roles and route
//! metadata for access gating, sensor descriptors and readings, and smoking
//! session records. Serialization derives are here because these types cross
//! the HTTP boundary unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_DASHBOARD_PATH: &str = "/admin-dashboard";
pub const USER_DASHBOARD_PATH: &str = "/user-dashboard";

//=========================================================================================
// Users & Access
//=========================================================================================

/// The role stored in a user's role document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// The landing route for this role. Mismatched navigation is redirected here.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => ADMIN_DASHBOARD_PATH,
            Role::User => USER_DASHBOARD_PATH,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

// Only used for sign-in - contains the plaintext password
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// Only used internally by the identity provider - contains the password hash
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: AuthUser,
    pub hashed_password: String,
}

/// Static per-route access metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub requires_auth: bool,
    pub role: Option<Role>,
}

impl RouteMeta {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn protected(role: Role) -> Self {
        Self {
            requires_auth: true,
            role: Some(role),
        }
    }

    /// Metadata for a nested record: it inherits `requires_auth` from its parent
    /// but must still name the role, since the role is read from the terminal record.
    pub fn inherit(role: Role) -> Self {
        Self {
            requires_auth: false,
            role: Some(role),
        }
    }
}

//=========================================================================================
// Sensors
//=========================================================================================

/// Free-form per-sensor configuration, merged into every persisted reading.
pub type SensorConfig = serde_json::Map<String, serde_json::Value>;

/// The kind of quantity a sensor measures. Unknown kinds are kept by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorType {
    Temperature,
    SmokeLevel,
    Other(String),
}

impl SensorType {
    /// The field of the telemetry payload that carries this sensor's value.
    pub fn field_name(&self) -> &str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::SmokeLevel => "smokeLevel",
            SensorType::Other(name) => name,
        }
    }

    /// Exclusive upper bound of simulated readings: degrees C for temperature,
    /// percent for smoke level and everything else.
    pub fn simulation_ceiling(&self) -> f64 {
        match self {
            SensorType::Temperature => 30.0,
            SensorType::SmokeLevel | SensorType::Other(_) => 100.0,
        }
    }
}

impl From<String> for SensorType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "temperature" => SensorType::Temperature,
            "smokeLevel" => SensorType::SmokeLevel,
            _ => SensorType::Other(value),
        }
    }
}

impl From<&str> for SensorType {
    fn from(value: &str) -> Self {
        SensorType::from(value.to_string())
    }
}

impl From<SensorType> for String {
    fn from(value: SensorType) -> Self {
        value.field_name().to_string()
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// In-memory registration record for one logical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    pub sensor_type: SensorType,
    pub config: SensorConfig,
    pub last_reading: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}

/// A reading about to be appended to the `sensorReadings` collection.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensorReading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub config: SensorConfig,
}

/// Serialized field names of a `SensorReading`; sensor config may not reuse them.
pub const READING_FIELDS: &[&str] = &["id", "sensorId", "type", "reading", "timestamp"];

/// A persisted reading. The sensor's config fields are spread into the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: Uuid,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub reading: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub config: SensorConfig,
}

/// One point of a chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorHistory {
    pub temperature: Vec<ReadingPoint>,
    pub smoke_level: Vec<ReadingPoint>,
}

/// Aggregate served to the dashboards: latest value of each series plus the
/// chronological history used for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestSensorData {
    pub temperature: f64,
    pub smoke_level: f64,
    pub timestamp: DateTime<Utc>,
    pub history: SensorHistory,
}

//=========================================================================================
// Smoking Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// Serialized field names of a `SmokingSession`; caller-supplied extra fields
/// may not reuse them.
pub const SESSION_FIELDS: &[&str] = &[
    "id",
    "startTime",
    "endTime",
    "status",
    "targetDuration",
    "currentDuration",
    "temperatureData",
    "smokeLevelData",
    "timestamps",
    "lastUpdated",
    "startedBy",
    "lastUpdatedBy",
];

/// Removes the keys of `extra` listed in `reserved` and returns them.
pub fn strip_reserved(
    extra: &mut serde_json::Map<String, serde_json::Value>,
    reserved: &[&str],
) -> Vec<String> {
    let shadowing: Vec<String> = extra
        .keys()
        .filter(|key| reserved.contains(&key.as_str()))
        .cloned()
        .collect();
    for key in &shadowing {
        extra.remove(key);
    }
    shadowing
}

/// A persisted run of the appliance, from start to completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokingSession {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Seconds.
    pub target_duration: i64,
    pub current_duration: i64,
    pub temperature_data: Vec<f64>,
    pub smoke_level_data: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub started_by: Option<String>,
    pub last_updated_by: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Caller input for starting a session. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub duration: i64,
    pub admin_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A fully-initialised session awaiting its server-assigned timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub id: Uuid,
    pub status: SessionStatus,
    pub target_duration: i64,
    pub current_duration: i64,
    pub temperature_data: Vec<f64>,
    pub smoke_level_data: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub last_updated_by: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A partial update merged into an existing session. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub admin_id: Option<String>,
    pub current_duration: Option<i64>,
    pub temperature_data: Option<Vec<f64>>,
    pub smoke_level_data: Option<Vec<f64>>,
    pub timestamps: Option<Vec<DateTime<Utc>>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

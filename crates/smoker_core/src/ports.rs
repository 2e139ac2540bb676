//! crates/smoker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the external collaborators:
//! the identity provider, the document store and the sensor telemetry endpoint.
//! The decision components in this crate only ever talk to these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{
    AuthUser, Credentials, NewSensorReading, ReadingPoint, Role, SensorReading, SensorType,
    SessionDraft, SessionStatus, SessionUpdate, SmokingSession, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Login session has expired")]
    Expired,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The JSON object returned by the telemetry endpoint, keyed by sensor type.
pub type TelemetryPayload = serde_json::Map<String, serde_json::Value>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    async fn sign_in(&self, credentials: Credentials) -> PortResult<AuthUser>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Every auth transition is published on this channel: `Some` on sign-in,
    /// `None` on sign-out or session expiry.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- users ---
    /// Reads the role document for `uid`. `Ok(None)` means the document is absent.
    async fn get_user_role(&self, uid: &str) -> PortResult<Option<Role>>;

    // --- sensorReadings ---
    async fn append_reading(&self, reading: NewSensorReading) -> PortResult<()>;

    /// The newest `limit` readings of `sensor_type` taken at or after `since`,
    /// ordered newest first.
    async fn recent_readings(
        &self,
        sensor_type: &SensorType,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<Vec<ReadingPoint>>;

    /// Readings of one sensor within `[start, end]`, oldest first.
    async fn readings_for_sensor(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<Vec<SensorReading>>;

    // --- smokingSessions ---
    /// Persists the draft, stamping start and last-updated times with the store's clock.
    async fn create_session(&self, draft: SessionDraft) -> PortResult<SmokingSession>;

    async fn sessions_with_status(&self, status: SessionStatus) -> PortResult<Vec<SmokingSession>>;

    async fn update_session(&self, session_id: Uuid, update: SessionUpdate) -> PortResult<()>;

    /// Marks the session completed and stamps its end time with the store's clock.
    async fn complete_session(&self, session_id: Uuid, admin_id: &str) -> PortResult<()>;
}

/// Accounts and login sessions backing the identity provider.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates the account together with its role document.
    async fn create_account(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<AuthUser>;

    async fn credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        uid: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// The owner of an unexpired login session. Unknown ids are `Unauthorized`;
    /// ids whose session has lapsed are `Expired`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetches the current values of the physical sensors.
    async fn fetch(&self) -> PortResult<TelemetryPayload>;
}

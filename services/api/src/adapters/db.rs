//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `DocumentStore` and `AccountStore` ports from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`. Session timestamps are
//! taken from the database clock (`now()`), never from the application host.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smoker_core::domain::{
    AuthUser, NewSensorReading, ReadingPoint, Role, SensorConfig, SensorReading, SensorType,
    SessionDraft, SessionStatus, SessionUpdate, SmokingSession, UserCredentials,
};
use smoker_core::ports::{AccountStore, DocumentStore, PortError, PortResult};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` and `AccountStore` ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: String,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user: AuthUser {
                uid: self.user_id,
                email: Some(self.email),
            },
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct AuthUserRecord {
    user_id: String,
    email: String,
}
impl AuthUserRecord {
    fn to_domain(self) -> AuthUser {
        AuthUser {
            uid: self.user_id,
            email: Some(self.email),
        }
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: String,
    email: String,
    live: bool,
}

#[derive(FromRow)]
struct ReadingPointRecord {
    reading: f64,
    recorded_at: DateTime<Utc>,
}
impl ReadingPointRecord {
    fn to_domain(self) -> ReadingPoint {
        ReadingPoint {
            value: self.reading,
            timestamp: self.recorded_at,
        }
    }
}

#[derive(FromRow)]
struct SensorReadingRecord {
    id: Uuid,
    sensor_id: String,
    sensor_type: String,
    reading: f64,
    recorded_at: DateTime<Utc>,
    config: Json<SensorConfig>,
}
impl SensorReadingRecord {
    fn to_domain(self) -> SensorReading {
        SensorReading {
            id: self.id,
            sensor_id: self.sensor_id,
            sensor_type: SensorType::from(self.sensor_type),
            reading: self.reading,
            timestamp: self.recorded_at,
            config: self.config.0,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    target_duration: i64,
    current_duration: i64,
    temperature_data: Vec<f64>,
    smoke_level_data: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
    started_by: Option<String>,
    last_updated_by: Option<String>,
    extra: Json<serde_json::Map<String, serde_json::Value>>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<SmokingSession> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Session {} has unknown status '{}'", self.id, self.status))
        })?;
        Ok(SmokingSession {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            target_duration: self.target_duration,
            current_duration: self.current_duration,
            temperature_data: self.temperature_data,
            smoke_level_data: self.smoke_level_data,
            timestamps: self.timestamps,
            last_updated: self.last_updated,
            started_by: self.started_by,
            last_updated_by: self.last_updated_by,
            extra: self.extra.0,
        })
    }
}

const SESSION_COLUMNS: &str = "id, start_time, end_time, status, target_duration, current_duration, \
     temperature_data, smoke_level_data, timestamps, last_updated, started_by, last_updated_by, extra";

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn get_user_role(&self, uid: &str) -> PortResult<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE user_id = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        role.map(|role| {
            Role::parse(&role).ok_or_else(|| {
                PortError::Unexpected(format!("User {} has unknown role '{}'", uid, role))
            })
        })
        .transpose()
    }

    async fn append_reading(&self, reading: NewSensorReading) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO sensor_readings (id, sensor_id, sensor_type, reading, recorded_at, config) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(&reading.sensor_id)
        .bind(reading.sensor_type.field_name())
        .bind(reading.value)
        .bind(reading.timestamp)
        .bind(Json(&reading.config))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn recent_readings(
        &self,
        sensor_type: &SensorType,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<Vec<ReadingPoint>> {
        let records = sqlx::query_as::<_, ReadingPointRecord>(
            "SELECT reading, recorded_at FROM sensor_readings \
             WHERE sensor_type = $1 AND recorded_at >= $2 \
             ORDER BY recorded_at DESC LIMIT $3",
        )
        .bind(sensor_type.field_name())
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn readings_for_sensor(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<Vec<SensorReading>> {
        let records = sqlx::query_as::<_, SensorReadingRecord>(
            "SELECT id, sensor_id, sensor_type, reading, recorded_at, config FROM sensor_readings \
             WHERE sensor_id = $1 AND recorded_at >= $2 AND recorded_at <= $3 \
             ORDER BY recorded_at ASC",
        )
        .bind(sensor_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_session(&self, draft: SessionDraft) -> PortResult<SmokingSession> {
        let query = format!(
            "INSERT INTO smoking_sessions (id, start_time, end_time, status, target_duration, \
             current_duration, temperature_data, smoke_level_data, timestamps, last_updated, \
             started_by, last_updated_by, extra) \
             VALUES ($1, now(), NULL, $2, $3, $4, $5, $6, $7, now(), $8, $9, $10) \
             RETURNING {}",
            SESSION_COLUMNS
        );
        let record = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(draft.id)
            .bind(draft.status.as_str())
            .bind(draft.target_duration)
            .bind(draft.current_duration)
            .bind(&draft.temperature_data)
            .bind(&draft.smoke_level_data)
            .bind(&draft.timestamps)
            .bind(&draft.started_by)
            .bind(&draft.last_updated_by)
            .bind(Json(&draft.extra))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        record.to_domain()
    }

    async fn sessions_with_status(&self, status: SessionStatus) -> PortResult<Vec<SmokingSession>> {
        let query = format!(
            "SELECT {} FROM smoking_sessions WHERE status = $1 ORDER BY start_time ASC",
            SESSION_COLUMNS
        );
        let records = sqlx::query_as::<_, SessionRecord>(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_session(&self, session_id: Uuid, update: SessionUpdate) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE smoking_sessions SET \
             current_duration = COALESCE($2, current_duration), \
             temperature_data = COALESCE($3, temperature_data), \
             smoke_level_data = COALESCE($4, smoke_level_data), \
             timestamps = COALESCE($5, timestamps), \
             extra = extra || $6, \
             last_updated = now(), \
             last_updated_by = $7 \
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(update.current_duration)
        .bind(update.temperature_data)
        .bind(update.smoke_level_data)
        .bind(update.timestamps)
        .bind(Json(update.extra))
        .bind(update.admin_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }

    async fn complete_session(&self, session_id: Uuid, admin_id: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE smoking_sessions SET status = $2, end_time = now(), last_updated = now(), \
             last_updated_by = $3 WHERE id = $1",
        )
        .bind(session_id)
        .bind(SessionStatus::Completed.as_str())
        .bind(admin_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_account(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthUserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, role) VALUES ($1, $2, $3, $4) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(hashed_password)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        uid: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(uid)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT u.user_id, u.email, s.expires_at > now() AS live FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;
        if !record.live {
            return Err(PortError::Expired);
        }
        Ok(AuthUserRecord {
            user_id: record.user_id,
            email: record.email,
        }
        .to_domain())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

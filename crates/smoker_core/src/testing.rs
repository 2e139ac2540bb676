//! In-memory stand-ins for the ports, used by unit tests here and, through the
//! `test-support` feature, by the service crate's tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{
    AuthUser, Credentials, NewSensorReading, ReadingPoint, Role, SensorReading, SensorType,
    SessionDraft, SessionStatus, SessionUpdate, SmokingSession, UserCredentials,
};
use crate::ports::{
    AccountStore, DocumentStore, IdentityProvider, PortError, PortResult, TelemetryPayload, TelemetrySource,
};

#[derive(Default)]
pub struct MemoryStore {
    roles: Mutex<HashMap<String, Role>>,
    readings: Mutex<Vec<SensorReading>>,
    sessions: Mutex<Vec<SmokingSession>>,
    accounts: Mutex<HashMap<String, UserCredentials>>,
    auth_sessions: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    role_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn put_role(&self, uid: &str, role: Role) {
        self.roles.lock().insert(uid.to_string(), role);
    }

    pub fn remove_role(&self, uid: &str) {
        self.roles.lock().remove(uid);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn role_lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.readings.lock().clone()
    }

    pub fn seed_reading(&self, sensor_id: &str, sensor_type: SensorType, value: f64, at: DateTime<Utc>) {
        self.readings.lock().push(SensorReading {
            id: Uuid::new_v4(),
            sensor_id: sensor_id.to_string(),
            sensor_type,
            reading: value,
            timestamp: at,
            config: Default::default(),
        });
    }

    fn check_read(&self) -> PortResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_user_role(&self, uid: &str) -> PortResult<Option<Role>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        Ok(self.roles.lock().get(uid).copied())
    }

    async fn append_reading(&self, reading: NewSensorReading) -> PortResult<()> {
        self.check_write()?;
        self.readings.lock().push(SensorReading {
            id: Uuid::new_v4(),
            sensor_id: reading.sensor_id,
            sensor_type: reading.sensor_type,
            reading: reading.value,
            timestamp: reading.timestamp,
            config: reading.config,
        });
        Ok(())
    }

    async fn recent_readings(
        &self,
        sensor_type: &SensorType,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<Vec<ReadingPoint>> {
        self.check_read()?;
        let mut points: Vec<ReadingPoint> = self
            .readings
            .lock()
            .iter()
            .filter(|r| &r.sensor_type == sensor_type && r.timestamp >= since)
            .map(|r| ReadingPoint {
                value: r.reading,
                timestamp: r.timestamp,
            })
            .collect();
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        points.truncate(limit);
        Ok(points)
    }

    async fn readings_for_sensor(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<Vec<SensorReading>> {
        self.check_read()?;
        let mut readings: Vec<SensorReading> = self
            .readings
            .lock()
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect();
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(readings)
    }

    async fn create_session(&self, draft: SessionDraft) -> PortResult<SmokingSession> {
        self.check_write()?;
        let now = Utc::now();
        let session = SmokingSession {
            id: draft.id,
            start_time: now,
            end_time: None,
            status: draft.status,
            target_duration: draft.target_duration,
            current_duration: draft.current_duration,
            temperature_data: draft.temperature_data,
            smoke_level_data: draft.smoke_level_data,
            timestamps: draft.timestamps,
            last_updated: now,
            started_by: draft.started_by,
            last_updated_by: draft.last_updated_by,
            extra: draft.extra,
        };
        self.sessions.lock().push(session.clone());
        Ok(session)
    }

    async fn sessions_with_status(&self, status: SessionStatus) -> PortResult<Vec<SmokingSession>> {
        self.check_read()?;
        Ok(self
            .sessions
            .lock()
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn update_session(&self, session_id: Uuid, update: SessionUpdate) -> PortResult<()> {
        self.check_write()?;
        let mut sessions = self.sessions.lock();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        if let Some(duration) = update.current_duration {
            session.current_duration = duration;
        }
        if let Some(data) = update.temperature_data {
            session.temperature_data = data;
        }
        if let Some(data) = update.smoke_level_data {
            session.smoke_level_data = data;
        }
        if let Some(data) = update.timestamps {
            session.timestamps = data;
        }
        session.extra.extend(update.extra);
        session.last_updated = Utc::now();
        session.last_updated_by = update.admin_id;
        Ok(())
    }

    async fn complete_session(&self, session_id: Uuid, admin_id: &str) -> PortResult<()> {
        self.check_write()?;
        let mut sessions = self.sessions.lock();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.end_time = Some(now);
        session.last_updated = now;
        session.last_updated_by = Some(admin_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<AuthUser> {
        self.check_write()?;
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(email) {
            return Err(PortError::Unexpected(format!("Email {} already registered", email)));
        }
        let user = AuthUser {
            uid: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        accounts.insert(
            email.to_string(),
            UserCredentials {
                user: user.clone(),
                hashed_password: hashed_password.to_string(),
            },
        );
        self.roles.lock().insert(user.uid.clone(), role);
        Ok(user)
    }

    async fn credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.check_read()?;
        self.accounts
            .lock()
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        uid: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.check_write()?;
        self.auth_sessions
            .lock()
            .insert(session_id.to_string(), (uid.to_string(), expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthUser> {
        self.check_read()?;
        let uid = match self.auth_sessions.lock().get(session_id) {
            Some((uid, expires_at)) if *expires_at > Utc::now() => uid.clone(),
            Some(_) => return Err(PortError::Expired),
            None => return Err(PortError::Unauthorized),
        };
        self.accounts
            .lock()
            .values()
            .find(|credentials| credentials.user.uid == uid)
            .map(|credentials| credentials.user.clone())
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.check_write()?;
        self.auth_sessions.lock().remove(session_id);
        Ok(())
    }
}

pub struct FakeIdentity {
    user: Mutex<Option<AuthUser>>,
    state: watch::Sender<Option<AuthUser>>,
    sign_outs: AtomicUsize,
}

impl FakeIdentity {
    pub fn signed_in(uid: &str) -> Self {
        Self::with_user(Some(AuthUser {
            uid: uid.to_string(),
            email: None,
        }))
    }

    pub fn signed_out() -> Self {
        Self::with_user(None)
    }

    fn with_user(user: Option<AuthUser>) -> Self {
        let (state, _) = watch::channel(user.clone());
        Self {
            user: Mutex::new(user),
            state,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn current_user(&self) -> Option<AuthUser> {
        self.user.lock().clone()
    }

    async fn sign_in(&self, credentials: Credentials) -> PortResult<AuthUser> {
        let user = AuthUser {
            uid: credentials.email.clone(),
            email: Some(credentials.email),
        };
        *self.user.lock() = Some(user.clone());
        self.state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.user.lock() = None;
        self.state.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}

pub struct FakeTelemetry {
    response: PortResult<TelemetryPayload>,
    calls: AtomicUsize,
}

impl FakeTelemetry {
    pub fn returning(payload: serde_json::Value) -> Self {
        let payload = match payload {
            serde_json::Value::Object(map) => map,
            _ => TelemetryPayload::new(),
        };
        Self {
            response: Ok(payload),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(PortError::Unexpected("HTTP 503".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for FakeTelemetry {
    async fn fetch(&self) -> PortResult<TelemetryPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}
